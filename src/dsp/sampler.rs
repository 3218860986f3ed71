//! Sample playback for tape loops.
//!
//! Plays a shared buffer once from the start at a fractional rate using
//! linear interpolation, with a linear fade-in so a loop never starts with
//! a click.

use std::sync::Arc;

/// A mono sample buffer shared between voices without copying.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    data: Arc<[f64]>,
    /// Native sample rate of the audio.
    pub sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(data: Vec<f64>, sample_rate: u32) -> Self {
        SampleBuffer {
            data: data.into(),
            sample_rate,
        }
    }

    /// Create from 16-bit signed PCM data.
    pub fn from_i16(pcm: &[i16], sample_rate: u32) -> Self {
        Self::new(pcm.iter().map(|&s| s as f64 / 32768.0).collect(), sample_rate)
    }

    /// Create from f32 samples.
    pub fn from_f32(samples: &[f32], sample_rate: u32) -> Self {
        Self::new(samples.iter().map(|&s| s as f64).collect(), sample_rate)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.data.len() as f64 / self.sample_rate.max(1) as f64
    }

    /// Read a sample with linear interpolation at a fractional position.
    pub fn read_interpolated(&self, position: f64) -> f64 {
        if self.data.is_empty() || position < 0.0 {
            return 0.0;
        }

        let idx = position as usize;
        if idx >= self.data.len() - 1 {
            return if idx < self.data.len() {
                self.data[idx]
            } else {
                0.0
            };
        }

        let frac = position - idx as f64;
        self.data[idx] * (1.0 - frac) + self.data[idx + 1] * frac
    }
}

/// One playing pass through a tape loop.
#[derive(Debug, Clone, Default)]
pub struct TapeVoice {
    buffer: Option<SampleBuffer>,
    /// Current read position in the buffer (fractional).
    position: f64,
    /// Buffer samples advanced per output sample.
    step: f64,
    gain: f64,
    target_gain: f64,
    /// Gain added per sample during the fade-in.
    fade_step: f64,
}

impl TapeVoice {
    pub fn new() -> Self {
        TapeVoice::default()
    }

    /// Start `buffer` from the top. `rate` is the playback-rate multiplier;
    /// the buffer/engine sample-rate ratio is applied on top.
    pub fn start(&mut self, buffer: &SampleBuffer, rate: f64, engine_rate: f64, gain: f64, fade_samples: usize) {
        self.step = rate * buffer.sample_rate as f64 / engine_rate.max(1.0);
        self.buffer = Some(buffer.clone());
        self.position = 0.0;
        self.gain = 0.0;
        self.target_gain = gain;
        self.fade_step = gain / fade_samples.max(1) as f64;
    }

    pub fn is_playing(&self) -> bool {
        self.buffer.is_some()
    }

    /// How far through the buffer playback is, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        match &self.buffer {
            Some(b) if !b.is_empty() => (self.position / b.len() as f64).min(1.0),
            _ => 1.0,
        }
    }

    #[inline]
    pub fn next_sample(&mut self) -> f64 {
        let Some(buffer) = &self.buffer else {
            return 0.0;
        };
        if self.position >= buffer.len() as f64 {
            self.buffer = None;
            return 0.0;
        }
        let s = buffer.read_interpolated(self.position) * self.gain;
        self.position += self.step;
        self.gain = (self.gain + self.fade_step).min(self.target_gain);
        s
    }

    pub fn stop(&mut self) {
        self.buffer = None;
    }
}
