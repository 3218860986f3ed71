//! Engine configuration: serde-backed, JSON-loadable, validated at init.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// One resonant body section: band-pass centre, quality factor, output weight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FormantConfig {
    pub frequency: f64,
    pub q: f64,
    pub gain: f64,
}

/// Starting values for every settable parameter (smoothers begin here).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialParams {
    pub tension: f64,
    pub damping: f64,
    pub excitation: f64,
    pub material: f64,
    pub frequency: f64,
    pub detune: f64,
    pub decay: f64,
    pub impulse: f64,
}

impl Default for InitialParams {
    fn default() -> Self {
        InitialParams {
            tension: 0.5,
            damping: 0.3,
            excitation: 0.7,
            material: 0.3,
            frequency: 261.63,
            detune: 0.0,
            decay: 0.1,
            impulse: 0.0,
        }
    }
}

/// Configuration for the string engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Output sample rate in Hz.
    pub sample_rate: f64,
    /// Samples per render block (parameters are read once per block).
    pub block_size: usize,
    /// Lowest playable pitch; sizes the delay lines.
    pub min_frequency: f64,
    /// Highest playable pitch.
    pub max_frequency: f64,
    /// Extra delay-line slack beyond one period of `min_frequency`.
    pub guard_samples: usize,
    /// Parameter smoothing time constant τ in seconds.
    pub smoothing_seconds: f64,
    /// Hard clamp applied to every value fed back into a delay line.
    pub safety_limit: f64,
    /// DC blocker pole.
    pub dc_block_pole: f64,
    pub output_drive: f64,
    pub output_level: f64,
    pub body_formants: Vec<FormantConfig>,
    pub initial: InitialParams,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            sample_rate: 48000.0,
            block_size: 128,
            min_frequency: 20.0,
            max_frequency: 2000.0,
            guard_samples: 1024,
            smoothing_seconds: 0.05,
            safety_limit: 1.8,
            dc_block_pole: 0.995,
            output_drive: 2.5,
            output_level: 0.6,
            body_formants: vec![
                FormantConfig { frequency: 110.0, q: 3.5, gain: 1.0 },
                FormantConfig { frequency: 185.0, q: 3.5, gain: 0.8 },
                FormantConfig { frequency: 310.0, q: 3.0, gain: 0.6 },
            ],
            initial: InitialParams::default(),
        }
    }
}

impl EngineConfig {
    /// Default configuration at the given sample rate.
    pub fn with_sample_rate(sample_rate: f64) -> Self {
        EngineConfig {
            sample_rate,
            ..EngineConfig::default()
        }
    }

    /// Parse a JSON config; absent fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate));
        }
        if self.block_size == 0 {
            return Err(ConfigError::InvalidBlockSize(self.block_size));
        }
        for (name, value) in [
            ("minFrequency", self.min_frequency),
            ("maxFrequency", self.max_frequency),
            ("initial.frequency", self.initial.frequency),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::DegenerateFrequency { name, value });
            }
        }
        if self.max_frequency < self.min_frequency {
            return Err(ConfigError::DegenerateFrequency {
                name: "maxFrequency",
                value: self.max_frequency,
            });
        }
        if !(self.smoothing_seconds.is_finite() && self.smoothing_seconds > 0.0) {
            return Err(ConfigError::InvalidSmoothing(self.smoothing_seconds));
        }
        // Formants above Nyquist are legal; the body bank leaves them out.
        for (index, formant) in self.body_formants.iter().enumerate() {
            if !(formant.frequency.is_finite() && formant.frequency > 0.0 && formant.q > 0.0) {
                return Err(ConfigError::InvalidFormant {
                    index,
                    frequency: formant.frequency,
                    q: formant.q,
                });
            }
        }
        Ok(())
    }

    /// Delay-line capacity: `ceil(sample_rate / min_frequency) + guard_samples`.
    pub fn delay_capacity(&self) -> usize {
        (self.sample_rate / self.min_frequency).ceil() as usize + self.guard_samples
    }
}

/// Configuration for the tape-loop (sample playback) sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TapeDeckConfig {
    pub master_gain: f64,
    /// Peak level each loop fades in to.
    pub voice_gain: f64,
    pub fade_in_seconds: f64,
    pub max_voices: usize,
    /// Largest chunk the master bus processes at once.
    pub max_block: usize,
    /// How long the activity flag stays raised after a trigger.
    pub activity_hold_seconds: f64,
    pub compressor_threshold: f64,
    pub compressor_knee: f64,
    pub compressor_ratio: f64,
    pub compressor_attack: f64,
    pub compressor_release: f64,
    /// Starting timbre (filter brightness and playback-rate shift).
    pub timbre: f64,
}

impl Default for TapeDeckConfig {
    fn default() -> Self {
        TapeDeckConfig {
            master_gain: 0.7,
            voice_gain: 0.5,
            fade_in_seconds: 0.1,
            max_voices: 16,
            max_block: 1024,
            activity_hold_seconds: 0.2,
            compressor_threshold: -24.0,
            compressor_knee: 30.0,
            compressor_ratio: 12.0,
            compressor_attack: 0.003,
            compressor_release: 0.25,
            timbre: 0.3,
        }
    }
}
