//! Delay line: fixed-capacity circular buffer with fractional reads.

/// A circular sample buffer: unit-step writes, linearly interpolated reads.
///
/// The buffer is allocated once at construction and never resized, so
/// `write`/`read` are safe to call from the render callback.
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<f64>,
    /// Next slot to be written. Always `< buffer.len()`.
    write_pos: usize,
}

impl DelayLine {
    /// Create a delay line holding `capacity` samples (at least 2).
    pub fn new(capacity: usize) -> Self {
        DelayLine {
            buffer: vec![0.0; capacity.max(2)],
            write_pos: 0,
        }
    }

    /// Create a delay line long enough for one period of `min_frequency`
    /// plus `guard_samples` of slack.
    pub fn for_pitch_range(sample_rate: f64, min_frequency: f64, guard_samples: usize) -> Self {
        let period = (sample_rate / min_frequency).ceil() as usize;
        Self::new(period + guard_samples)
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn write_pos(&self) -> usize {
        self.write_pos
    }

    /// Store a sample at the write head and advance it.
    #[inline]
    pub fn write(&mut self, sample: f64) {
        self.buffer[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
    }

    /// Read the value `lag` samples behind the write head.
    ///
    /// `lag` may be fractional; it is clamped to `[0, N-1]` so an
    /// out-of-range pitch can never index outside the buffer.
    #[inline]
    pub fn read(&self, lag: f64) -> f64 {
        let len = self.buffer.len();
        let max_lag = (len - 1) as f64;
        let lag = if lag.is_finite() { lag.clamp(0.0, max_lag) } else { max_lag };

        let pos = self.write_pos as f64 - lag;
        let pos = if pos < 0.0 { pos + len as f64 } else { pos };
        let i0 = (pos as usize) % len;
        let i1 = (i0 + 1) % len;
        let frac = pos - pos.floor();

        self.buffer[i0] * (1.0 - frac) + self.buffer[i1] * frac
    }

    /// Zero the buffer and rewind the write head.
    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_from_pitch_range() {
        let d = DelayLine::for_pitch_range(48000.0, 20.0, 1024);
        assert_eq!(d.capacity(), 2400 + 1024);
    }

    #[test]
    fn integer_lag_returns_written_sample() {
        let mut d = DelayLine::new(64);
        for i in 0..10 {
            d.write(i as f64);
        }
        // Last written value (9) sits one slot behind the write head.
        assert!((d.read(1.0) - 9.0).abs() < 1e-12);
        assert!((d.read(4.0) - 6.0).abs() < 1e-12);
    }

    #[test]
    fn fractional_lag_interpolates() {
        let mut d = DelayLine::new(16);
        d.write(0.0);
        d.write(1.0);
        // lag 1 → 1.0, lag 2 → 0.0, lag 1.25 → 0.75
        let v = d.read(1.25);
        assert!((v - 0.75).abs() < 1e-12, "expected 0.75, got {v}");
    }

    #[test]
    fn oversized_lag_is_clamped() {
        let mut d = DelayLine::new(8);
        for i in 0..8 {
            d.write(i as f64 + 1.0);
        }
        let clamped = d.read(1000.0);
        let edge = d.read(7.0);
        assert!((clamped - edge).abs() < 1e-12);
        assert!(d.read(f64::INFINITY).is_finite());
        assert!(d.read(-3.0).is_finite());
    }

    #[test]
    fn write_head_wraps() {
        let mut d = DelayLine::new(5);
        for _ in 0..23 {
            d.write(0.5);
            assert!(d.write_pos() < d.capacity());
        }
        assert_eq!(d.write_pos(), 23 % 5);
    }

    #[test]
    fn clear_silences() {
        let mut d = DelayLine::new(8);
        d.write(1.0);
        d.clear();
        for lag in 0..8 {
            assert_eq!(d.read(lag as f64), 0.0);
        }
    }
}
