//! String voice: Karplus-Strong waveguide with an optional detuned sibling.

use super::delay::DelayLine;
use super::filter::OnePole;

/// Loop-filter coefficient at `tension = 0` (darkest, longest sustain).
pub const ALPHA_MIN: f64 = 0.01;
/// Loop-filter coefficient at `tension = 1` (brightest).
pub const ALPHA_MAX: f64 = 0.91;
/// Feedback gain at `damping = 0`.
pub const FEEDBACK_MAX: f64 = 0.9997;
/// Feedback gain at `damping = 1`.
pub const FEEDBACK_MIN: f64 = 0.992;
/// Hard ceiling on loop gain; anything at or above 1 would let energy grow.
pub const FEEDBACK_CEILING: f64 = 0.9999;
/// Maximum pitch ratio of the sibling string (`detune = 1`).
pub const DETUNE_RANGE: f64 = 0.06;

/// `α = αmin + tension·(αmax − αmin)`.
pub fn tension_to_alpha(tension: f64) -> f64 {
    ALPHA_MIN + tension.clamp(0.0, 1.0) * (ALPHA_MAX - ALPHA_MIN)
}

/// Higher damping → lower loop gain → faster decay. Always `< 1`.
pub fn damping_to_feedback(damping: f64) -> f64 {
    let g = FEEDBACK_MAX - damping.clamp(0.0, 1.0) * (FEEDBACK_MAX - FEEDBACK_MIN);
    g.min(FEEDBACK_CEILING)
}

/// `detuneRatio = 1 + detune·k`.
pub fn detune_ratio(detune: f64) -> f64 {
    1.0 + detune.clamp(0.0, 1.0) * DETUNE_RANGE
}

/// Per-sample physical controls for the waveguide.
#[derive(Debug, Clone, Copy)]
pub struct StringControls {
    pub frequency: f64,
    /// Loop-filter coefficient (from tension).
    pub alpha: f64,
    /// Loop gain (from damping).
    pub feedback: f64,
    /// Sibling detune amount; doubles as the sibling's mix weight.
    pub detune: f64,
}

/// One waveguide loop: delay line plus one-pole loop filter.
#[derive(Debug, Clone)]
struct Waveguide {
    line: DelayLine,
    loop_filter: OnePole,
}

impl Waveguide {
    fn new(capacity: usize) -> Self {
        Waveguide {
            line: DelayLine::new(capacity),
            loop_filter: OnePole::new(),
        }
    }

    #[inline]
    fn tick(&mut self, lag: f64, excitation: f64, alpha: f64, feedback: f64, limit: f64) -> f64 {
        let delayed = self.line.read(lag);
        let mut y = self.loop_filter.process(delayed + excitation, alpha);
        if !y.is_finite() {
            y = 0.0;
        }
        let y = y.clamp(-limit, limit);
        self.loop_filter.set_value(y);
        self.line.write(y * feedback);
        y
    }

    fn clear(&mut self) {
        self.line.clear();
        self.loop_filter.reset();
    }
}

/// A plucked/bowed string: a primary waveguide and an optional detuned sibling
/// that beats against it.
#[derive(Debug, Clone)]
pub struct StringVoice {
    primary: Waveguide,
    sibling: Option<Waveguide>,
    sample_rate: f64,
    /// Hard clamp for every value written back into a delay line.
    safety_limit: f64,
    last_output: f64,
}

impl StringVoice {
    /// Allocate both delay lines up front (`capacity` samples each).
    pub fn new(sample_rate: f64, capacity: usize, with_sibling: bool, safety_limit: f64) -> Self {
        StringVoice {
            primary: Waveguide::new(capacity),
            sibling: with_sibling.then(|| Waveguide::new(capacity)),
            sample_rate,
            safety_limit: safety_limit.abs().max(1e-3),
            last_output: 0.0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.primary.line.capacity()
    }

    /// Lag in samples for `frequency`, kept inside the delay line.
    pub fn lag_for(&self, frequency: f64) -> f64 {
        let max_lag = (self.capacity() - 1) as f64;
        (self.sample_rate / frequency.max(1e-3)).clamp(1.0, max_lag)
    }

    /// The most recent mixed output (what a bow "feels").
    pub fn last_output(&self) -> f64 {
        self.last_output
    }

    /// Advance the string one sample, injecting `excitation` into both loops.
    #[inline]
    pub fn next_sample(&mut self, excitation: f64, controls: &StringControls) -> f64 {
        let feedback = controls.feedback.min(FEEDBACK_CEILING);
        let alpha = controls.alpha.clamp(1e-6, 1.0);
        let lag = self.lag_for(controls.frequency);
        let limit = self.safety_limit;

        let v1 = self.primary.tick(lag, excitation, alpha, feedback, limit);
        let mixed = match self.sibling.as_mut() {
            Some(sibling) => {
                let lag2 = (lag * detune_ratio(controls.detune)).min((self.primary.line.capacity() - 1) as f64);
                let v2 = sibling.tick(lag2, excitation, alpha, feedback, limit);
                (v1 + v2 * controls.detune.clamp(0.0, 1.0)) * 0.5
            }
            None => v1,
        };
        self.last_output = mixed;
        mixed
    }

    pub fn clear(&mut self) {
        self.primary.clear();
        if let Some(s) = self.sibling.as_mut() {
            s.clear();
        }
        self.last_output = 0.0;
    }
}
