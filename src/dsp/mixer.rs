//! Mixer: sums voice outputs with master gain, and the final output stage.

use super::filter::DcBlocker;

/// A summing mixer over a buffer allocated once at construction.
#[derive(Debug, Clone)]
pub struct Mixer {
    pub master_gain: f64,
    buffer: Vec<f64>,
}

impl Mixer {
    /// `max_block` bounds every later `clear`; nothing reallocates after this.
    pub fn new(max_block: usize) -> Self {
        Mixer {
            master_gain: 0.8,
            buffer: Vec::with_capacity(max_block),
        }
    }

    /// Zero the first `num_samples` slots (capped at the allocated capacity).
    pub fn clear(&mut self, num_samples: usize) {
        let n = num_samples.min(self.buffer.capacity());
        self.buffer.clear();
        self.buffer.resize(n, 0.0);
    }

    /// Add a sample at the given index.
    #[inline]
    pub fn add(&mut self, index: usize, sample: f64) {
        if let Some(slot) = self.buffer.get_mut(index) {
            *slot += sample;
        }
    }

    /// Mixed sample at `index` with master gain applied.
    #[inline]
    pub fn get(&self, index: usize) -> f64 {
        self.buffer.get(index).map_or(0.0, |s| s * self.master_gain)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// DC blocker followed by a tanh soft clipper.
#[derive(Debug, Clone)]
pub struct OutputStage {
    dc: DcBlocker,
    drive: f64,
    level: f64,
}

impl OutputStage {
    pub fn new(dc_pole: f64, drive: f64, level: f64) -> Self {
        OutputStage {
            dc: DcBlocker::new(dc_pole),
            drive,
            level,
        }
    }

    #[inline]
    pub fn process(&mut self, x: f64) -> f64 {
        soft_clip(self.dc.process(x) * self.drive) * self.level
    }

    pub fn reset(&mut self) {
        self.dc.reset();
    }
}

/// Soft clipper using tanh to prevent harsh digital clipping.
#[inline]
pub fn soft_clip(x: f64) -> f64 {
    x.tanh()
}
