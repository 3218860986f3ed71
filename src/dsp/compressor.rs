//! Compressor: dynamics processing for the tape-loop master bus.
//!
//! Feed-forward peak compressor with threshold, ratio, soft knee, attack and
//! release, modelled on the WebAudio DynamicsCompressorNode.

use crate::config::TapeDeckConfig;

/// A mono dynamics compressor.
#[derive(Debug, Clone)]
pub struct Compressor {
    /// Threshold in dB (typical: -50 to 0).
    pub threshold: f64,
    /// Compression ratio (e.g., 4.0 = 4:1 compression).
    pub ratio: f64,
    /// Knee width in dB (0 = hard knee, higher = softer transition).
    pub knee: f64,
    /// Makeup gain in dB.
    pub makeup_gain: f64,

    attack_coef: f64,
    release_coef: f64,
    envelope: f64,
}

impl Compressor {
    pub fn new(sample_rate: f64, threshold: f64, knee: f64, ratio: f64, attack: f64, release: f64) -> Self {
        Compressor {
            threshold: threshold.clamp(-100.0, 0.0),
            ratio: ratio.clamp(1.0, 20.0),
            knee: knee.clamp(0.0, 40.0),
            makeup_gain: 0.0,
            attack_coef: Self::time_coef(attack.clamp(0.0001, 1.0), sample_rate),
            release_coef: Self::time_coef(release.clamp(0.001, 5.0), sample_rate),
            envelope: 0.0,
        }
    }

    /// Compressor configured from the tape deck's master-bus settings.
    pub fn from_config(sample_rate: f64, config: &TapeDeckConfig) -> Self {
        Self::new(
            sample_rate,
            config.compressor_threshold,
            config.compressor_knee,
            config.compressor_ratio,
            config.compressor_attack,
            config.compressor_release,
        )
    }

    fn time_coef(seconds: f64, sample_rate: f64) -> f64 {
        (-1.0 / (seconds * sample_rate)).exp()
    }

    #[inline]
    fn linear_to_db(linear: f64) -> f64 {
        if linear <= 0.0 {
            -120.0
        } else {
            20.0 * linear.log10()
        }
    }

    #[inline]
    fn db_to_linear(db: f64) -> f64 {
        10.0_f64.powf(db / 20.0)
    }

    /// Gain change in dB (≤ 0) for an input level in dB.
    #[inline]
    fn compute_gain(&self, input_db: f64) -> f64 {
        let slope = 1.0 - 1.0 / self.ratio;
        if self.knee <= 0.0 {
            if input_db <= self.threshold {
                0.0
            } else {
                (self.threshold - input_db) * slope
            }
        } else {
            let half_knee = self.knee / 2.0;
            let knee_start = self.threshold - half_knee;
            let knee_end = self.threshold + half_knee;

            if input_db <= knee_start {
                0.0
            } else if input_db >= knee_end {
                (self.threshold - input_db) * slope
            } else {
                // Quadratic blend across the knee.
                let x = input_db - knee_start;
                -slope * x * x / (2.0 * self.knee)
            }
        }
    }

    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let level = input.abs();
        let coef = if level > self.envelope {
            self.attack_coef
        } else {
            self.release_coef
        };
        self.envelope = coef * self.envelope + (1.0 - coef) * level;

        let gain_db = self.compute_gain(Self::linear_to_db(self.envelope)) + self.makeup_gain;
        input * Self::db_to_linear(gain_db)
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }

    /// Current gain reduction in dB (for metering).
    pub fn gain_reduction(&self) -> f64 {
        -self.compute_gain(Self::linear_to_db(self.envelope))
    }
}
