//! Exciter: the energy injected into the string at (and during) a gate.
//!
//! Four mutually exclusive modes. The three burst modes fire once on the
//! gate's rising edge; `Bow` keeps pushing a friction force into the string
//! for as long as the gate stays up.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::envelope::BurstEnvelope;
use super::filter::OnePole;
use super::smoother::Smoother;

/// Gate level that counts as "high" for edge detection.
pub const GATE_THRESHOLD: f64 = 0.5;
/// Below this gate level the bow is lifted off the string.
const BOW_THRESHOLD: f64 = 0.01;
/// How long a one-shot trigger holds the gate up, in seconds.
const GATE_PULSE_SECONDS: f64 = 0.01;
const GATE_ATTACK_SECONDS: f64 = 0.0005;
const GATE_RELEASE_SECONDS: f64 = 0.005;

/// Half-period of the pulse transient, in samples.
const PULSE_HALF_PERIOD: usize = 10;
const PULSE_RELEASE_SECONDS: f64 = 0.004;
/// One-pole coefficient giving the shaped burst its darker tilt.
const SHAPED_TILT: f64 = 0.35;
const SHAPED_GAIN: f64 = 2.0;

const EXCITATION_FLOOR: f64 = 0.2;
const BOW_VELOCITY: f64 = 0.2;
/// Relative bow-speed jitter (rosin noise) that keeps the bowed tone alive.
const BOW_ROSIN: f64 = 0.05;
const FRICTION_OFFSET: f64 = 0.75;
const FRICTION_EXPONENT: i32 = 4;

/// Excitation behaviour selected at trigger time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExciterMode {
    /// White-noise burst under a short exponential envelope.
    Percussive,
    /// Noise burst whose amplitude also tapers across the window.
    Shaped,
    /// Alternating ±1 transient for a hard, tonal attack.
    Pulse,
    /// Continuous stick-slip friction while the gate is held.
    Bow,
}

impl ExciterMode {
    pub const ALL: [ExciterMode; 4] = [
        ExciterMode::Percussive,
        ExciterMode::Shaped,
        ExciterMode::Pulse,
        ExciterMode::Bow,
    ];

    /// Map the continuous `impulse` control onto a mode.
    pub fn from_impulse(value: f64) -> Self {
        if value < 0.33 {
            ExciterMode::Percussive
        } else if value < 0.66 {
            ExciterMode::Shaped
        } else if value < 0.9 {
            ExciterMode::Pulse
        } else {
            ExciterMode::Bow
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            ExciterMode::Percussive => 0,
            ExciterMode::Shaped => 1,
            ExciterMode::Pulse => 2,
            ExciterMode::Bow => 3,
        }
    }

    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => ExciterMode::Shaped,
            2 => ExciterMode::Pulse,
            3 => ExciterMode::Bow,
            _ => ExciterMode::Percussive,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ExciterMode::Percussive => "percussive",
            ExciterMode::Shaped => "shaped",
            ExciterMode::Pulse => "pulse",
            ExciterMode::Bow => "bow",
        }
    }
}

impl FromStr for ExciterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "percussive" | "white" => Ok(ExciterMode::Percussive),
            "shaped" | "pink" => Ok(ExciterMode::Shaped),
            "pulse" => Ok(ExciterMode::Pulse),
            "bow" | "bowed" => Ok(ExciterMode::Bow),
            _ => Err(s.to_string()),
        }
    }
}

/// xorshift32 white noise in [-1, 1].
#[derive(Debug, Clone)]
pub struct Noise {
    state: u32,
}

impl Noise {
    pub fn new(seed: u32) -> Self {
        Noise {
            state: if seed == 0 { 0x1234_5678 } else { seed },
        }
    }

    #[inline]
    pub fn next(&mut self) -> f64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        (x as f64 / u32::MAX as f64) * 2.0 - 1.0
    }
}

/// Stick-slip friction curve `(|v| + c)^-k`.
#[inline]
pub fn friction_curve(v: f64) -> f64 {
    (v.abs() + FRICTION_OFFSET).powi(-FRICTION_EXPONENT)
}

/// Generates the excitation signal for one string.
#[derive(Debug, Clone)]
pub struct Exciter {
    mode: ExciterMode,
    intensity: f64,
    decay: f64,
    excitation: f64,

    gate: f64,
    gate_target: f64,
    prev_gate: f64,
    /// Samples left before a one-shot pulse drops the gate target.
    hold_remaining: Option<usize>,
    pulse_samples: usize,
    gate_attack_coef: f64,
    gate_release_coef: f64,

    envelope: BurstEnvelope,
    burst_window: usize,
    burst_remaining: usize,
    pulse_counter: usize,
    tilt: OnePole,
    noise: Noise,
    bursts: u64,
    sample_rate: f64,
}

impl Exciter {
    pub fn new(sample_rate: f64) -> Self {
        Exciter {
            mode: ExciterMode::Percussive,
            intensity: 1.0,
            decay: 0.1,
            excitation: 0.7,
            gate: 0.0,
            gate_target: 0.0,
            prev_gate: 0.0,
            hold_remaining: None,
            pulse_samples: (GATE_PULSE_SECONDS * sample_rate).max(1.0) as usize,
            gate_attack_coef: Smoother::coefficient(GATE_ATTACK_SECONDS, sample_rate),
            gate_release_coef: Smoother::coefficient(GATE_RELEASE_SECONDS, sample_rate),
            envelope: BurstEnvelope::new(sample_rate),
            burst_window: 1,
            burst_remaining: 0,
            pulse_counter: 0,
            tilt: OnePole::new(),
            noise: Noise::new(0x1234_5678),
            bursts: 0,
            sample_rate,
        }
    }

    /// Update the shape controls. The engine feeds smoothed values every sample.
    #[inline]
    pub fn set_shape(&mut self, decay: f64, excitation: f64) {
        self.decay = decay.clamp(0.0, 1.0);
        self.excitation = excitation.clamp(0.0, 1.0);
    }

    /// Raise the gate. One-shot modes drop it again after a short pulse;
    /// `Bow` holds it until [`release`](Self::release).
    pub fn trigger(&mut self, mode: ExciterMode, intensity: f64) {
        self.mode = mode;
        self.intensity = intensity.clamp(0.0, 1.0);
        self.gate_target = 1.0;
        self.hold_remaining = match mode {
            ExciterMode::Bow => None,
            _ => Some(self.pulse_samples),
        };
        // Already high: no edge will occur, so restart the burst here.
        if self.gate > GATE_THRESHOLD {
            self.start_burst();
        }
    }

    /// Ramp the gate back to zero.
    ///
    /// A release that lands before a pending trigger has raised the gate
    /// holds it up for one pulse first, so the onset still happens.
    pub fn release(&mut self) {
        let rising = self.gate_target > GATE_THRESHOLD && self.gate <= GATE_THRESHOLD;
        if rising {
            let hold = self.hold_remaining.map_or(self.pulse_samples, |h| h.min(self.pulse_samples));
            self.hold_remaining = Some(hold);
        } else {
            self.gate_target = 0.0;
            self.hold_remaining = None;
        }
    }

    pub fn mode(&self) -> ExciterMode {
        self.mode
    }

    pub fn gate_level(&self) -> f64 {
        self.gate
    }

    pub fn excitation(&self) -> f64 {
        self.excitation
    }

    /// Number of bursts started since construction.
    pub fn burst_count(&self) -> u64 {
        self.bursts
    }

    /// True while a burst is sounding or the bow is on the string.
    pub fn is_active(&self) -> bool {
        !self.envelope.is_finished() || (self.mode == ExciterMode::Bow && self.gate > BOW_THRESHOLD)
    }

    fn start_burst(&mut self) {
        let (attack, release) = match self.mode {
            ExciterMode::Percussive | ExciterMode::Shaped => (
                0.001 + 0.004 * (1.0 - self.excitation),
                0.005 + 0.045 * self.decay,
            ),
            ExciterMode::Pulse => (0.001, PULSE_RELEASE_SECONDS),
            ExciterMode::Bow => return,
        };
        self.envelope.attack = attack;
        self.envelope.release = release;
        self.envelope.trigger();
        self.burst_window = self.envelope.burst_length().max(1);
        self.burst_remaining = self.burst_window;
        self.pulse_counter = 0;
        self.bursts += 1;
    }

    /// Produce the next excitation sample. `string_signal` is the string's
    /// most recent output (the bow reads it to compute relative velocity).
    #[inline]
    pub fn next_sample(&mut self, string_signal: f64) -> f64 {
        if let Some(remaining) = self.hold_remaining.as_mut() {
            if *remaining == 0 {
                self.gate_target = 0.0;
                self.hold_remaining = None;
            } else {
                *remaining -= 1;
            }
        }

        let coef = if self.gate_target > self.gate {
            self.gate_attack_coef
        } else {
            self.gate_release_coef
        };
        self.gate += (self.gate_target - self.gate) * coef;

        if self.gate > GATE_THRESHOLD && self.prev_gate <= GATE_THRESHOLD {
            self.start_burst();
        }
        self.prev_gate = self.gate;

        match self.mode {
            ExciterMode::Bow => self.bow_sample(string_signal),
            _ => self.burst_sample(),
        }
    }

    fn burst_sample(&mut self) -> f64 {
        if self.envelope.is_finished() {
            return 0.0;
        }
        let env = self.envelope.next_sample();
        let raw = match self.mode {
            ExciterMode::Shaped => {
                let taper = self.burst_remaining as f64 / self.burst_window as f64;
                self.tilt.process(self.noise.next(), SHAPED_TILT) * taper * SHAPED_GAIN
            }
            ExciterMode::Pulse => {
                if (self.pulse_counter / PULSE_HALF_PERIOD) % 2 == 1 {
                    1.0
                } else {
                    -1.0
                }
            }
            _ => self.noise.next(),
        };
        self.burst_remaining = self.burst_remaining.saturating_sub(1);
        self.pulse_counter += 1;

        let amplitude = EXCITATION_FLOOR + (1.0 - EXCITATION_FLOOR) * self.excitation;
        raw * env * self.intensity * amplitude
    }

    fn bow_sample(&mut self, string_signal: f64) -> f64 {
        if self.gate <= BOW_THRESHOLD {
            return 0.0;
        }
        let pressure = 0.3 + 0.7 * self.excitation;
        let bow_velocity = BOW_VELOCITY * self.intensity * (1.0 + BOW_ROSIN * self.noise.next());
        let v = bow_velocity - string_signal;
        v * friction_curve(v) * pressure * self.gate
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}
