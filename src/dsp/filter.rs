//! Filters: RBJ biquad sections, the one-pole loop filter, and a DC blocker.

use std::f64::consts::PI;

/// Biquad response shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterType {
    Lowpass,
    /// Constant 0 dB peak gain band-pass.
    Bandpass,
}

/// A biquad IIR filter (2nd order).
///
/// Implements the standard Direct Form II Transposed structure.
/// Coefficient formulas from the Audio EQ Cookbook (Robert Bristow-Johnson).
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    pub filter_type: FilterType,
    pub frequency: f64,
    pub q: f64,

    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,

    z1: f64,
    z2: f64,

    sample_rate: f64,
    dirty: bool,
}

impl BiquadFilter {
    pub fn new(filter_type: FilterType, sample_rate: f64) -> Self {
        let mut f = BiquadFilter {
            filter_type,
            frequency: 1000.0,
            q: 0.707, // Butterworth
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
            sample_rate,
            dirty: true,
        };
        f.update_coefficients();
        f
    }

    /// Build a filter with fixed centre/cutoff and Q.
    pub fn with_params(filter_type: FilterType, sample_rate: f64, frequency: f64, q: f64) -> Self {
        let mut f = Self::new(filter_type, sample_rate);
        f.frequency = frequency;
        f.q = q;
        f.update_coefficients();
        f
    }

    /// Recompute filter coefficients from current parameters.
    pub fn update_coefficients(&mut self) {
        let nyquist = self.sample_rate / 2.0;
        let freq = self.frequency.clamp(1.0, nyquist * 0.999);
        let q = self.q.max(1e-4);

        let w0 = 2.0 * PI * freq / self.sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q);

        let (b0, b1, b2) = match self.filter_type {
            FilterType::Lowpass => {
                let b1 = 1.0 - cos_w0;
                (b1 / 2.0, b1, b1 / 2.0)
            }
            FilterType::Bandpass => (alpha, 0.0, -alpha),
        };
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        // Normalize by a0
        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
        self.dirty = false;
    }

    /// Process a single sample through the filter.
    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        if self.dirty {
            self.update_coefficients();
        }

        let output = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * output + self.z2;
        self.z2 = self.b2 * input - self.a2 * output;
        output
    }

    /// Reset filter state.
    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }

    /// Set frequency and mark coefficients dirty.
    pub fn set_frequency(&mut self, freq: f64) {
        self.frequency = freq;
        self.dirty = true;
    }

    /// Set Q and mark coefficients dirty.
    pub fn set_q(&mut self, q: f64) {
        self.q = q;
        self.dirty = true;
    }
}

/// One-pole low-pass: `y = α·x + (1-α)·y`.
///
/// For `α ∈ (0, 1]` the DC gain is exactly 1 and |H(ω)| ≤ 1 everywhere,
/// so it can sit inside a feedback loop without adding energy.
#[derive(Debug, Clone, Default)]
pub struct OnePole {
    state: f64,
}

impl OnePole {
    pub fn new() -> Self {
        OnePole { state: 0.0 }
    }

    #[inline]
    pub fn process(&mut self, input: f64, alpha: f64) -> f64 {
        let alpha = alpha.clamp(1e-6, 1.0);
        self.state = alpha * input + (1.0 - alpha) * self.state;
        self.state
    }

    pub fn value(&self) -> f64 {
        self.state
    }

    /// Overwrite the accumulator (used by the numeric guard).
    pub fn set_value(&mut self, value: f64) {
        self.state = value;
    }

    pub fn reset(&mut self) {
        self.state = 0.0;
    }
}

/// DC blocker: `y[n] = x[n] - x[n-1] + R·y[n-1]`.
#[derive(Debug, Clone)]
pub struct DcBlocker {
    pole: f64,
    x1: f64,
    y1: f64,
}

impl DcBlocker {
    pub fn new(pole: f64) -> Self {
        DcBlocker {
            pole: pole.clamp(0.0, 0.9999),
            x1: 0.0,
            y1: 0.0,
        }
    }

    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let y = input - self.x1 + self.pole * self.y1;
        self.x1 = input;
        self.y1 = y;
        y
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.y1 = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowpass_passes_dc() {
        let mut f = BiquadFilter::with_params(FilterType::Lowpass, 44100.0, 5000.0, 0.707);

        // Feed DC signal (1.0), should converge to 1.0
        let mut output = 0.0;
        for _ in 0..1000 {
            output = f.process(1.0);
        }
        assert!(
            (output - 1.0).abs() < 0.001,
            "Lowpass should pass DC, got {output}"
        );
    }

    #[test]
    fn lowpass_attenuates_high_freq() {
        let mut f = BiquadFilter::with_params(FilterType::Lowpass, 44100.0, 200.0, 0.707);

        let freq = 10000.0;
        let mut max_out = 0.0_f64;
        for i in 0..4410 {
            let t = i as f64 / 44100.0;
            let input = (2.0 * PI * freq * t).sin();
            let out = f.process(input);
            if i > 1000 {
                max_out = max_out.max(out.abs());
            }
        }
        assert!(
            max_out < 0.01,
            "Lowpass@200Hz should strongly attenuate 10kHz, got amplitude {max_out}"
        );
    }

    #[test]
    fn bandpass_peaks_at_centre() {
        let sr = 48000.0;
        let measure = |freq: f64| {
            let mut f = BiquadFilter::with_params(FilterType::Bandpass, sr, 185.0, 3.5);
            let mut peak = 0.0_f64;
            for i in 0..48000 {
                let x = (2.0 * PI * freq * i as f64 / sr).sin();
                let y = f.process(x);
                if i > 24000 {
                    peak = peak.max(y.abs());
                }
            }
            peak
        };
        let centre = measure(185.0);
        let off = measure(1500.0);
        assert!((centre - 1.0).abs() < 0.05, "0 dB peak expected, got {centre}");
        assert!(off < 0.2, "off-band response should be small, got {off}");
    }

    #[test]
    fn filter_output_finite() {
        let mut f = BiquadFilter::with_params(FilterType::Bandpass, 44100.0, 1000.0, 4.0);
        for i in 0..10000 {
            let input = if i % 100 == 0 { 1.0 } else { 0.0 };
            let out = f.process(input);
            assert!(out.is_finite(), "Filter output not finite at sample {i}");
        }
    }

    #[test]
    fn set_frequency_takes_effect() {
        let mut f = BiquadFilter::with_params(FilterType::Lowpass, 44100.0, 200.0, 0.707);
        f.set_frequency(15000.0);
        f.set_q(0.707);
        let mut max_out = 0.0_f64;
        for i in 0..4410 {
            let x = (2.0 * PI * 5000.0 * i as f64 / 44100.0).sin();
            let y = f.process(x);
            if i > 1000 {
                max_out = max_out.max(y.abs());
            }
        }
        assert!(max_out > 0.8, "raised cutoff should pass 5 kHz, got {max_out}");
    }

    #[test]
    fn one_pole_never_adds_gain() {
        for &alpha in &[0.01, 0.3, 0.91, 1.0] {
            let mut lp = OnePole::new();
            for i in 0..5000 {
                let x = if i % 2 == 0 { 1.0 } else { -1.0 };
                let y = lp.process(x, alpha);
                assert!(y.abs() <= 1.0 + 1e-12, "alpha {alpha}: |y|={y}");
            }
            let mut dc = OnePole::new();
            let mut y = 0.0;
            for _ in 0..100_000 {
                y = dc.process(1.0, alpha);
            }
            assert!((y - 1.0).abs() < 1e-6, "DC gain should be unity, got {y}");
        }
    }

    #[test]
    fn dc_blocker_removes_offset() {
        let mut dc = DcBlocker::new(0.995);
        let mut y = 1.0;
        for _ in 0..20000 {
            y = dc.process(0.5);
        }
        assert!(y.abs() < 1e-6, "DC should be removed, got {y}");
    }
}
