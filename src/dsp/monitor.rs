//! Read-only output monitor for visualizers.
//!
//! Written by the render domain at the end of every block, read from anywhere
//! without locking.

use std::sync::atomic::{AtomicBool, Ordering};

use atomic_float::AtomicF32;

/// Points kept in the waveform snapshot.
pub const SNAPSHOT_LEN: usize = 128;
/// Block peak below which the engine counts as silent.
pub const ACTIVITY_FLOOR: f32 = 1e-5;

#[derive(Debug)]
pub struct Monitor {
    peak: AtomicF32,
    active: AtomicBool,
    snapshot: [AtomicF32; SNAPSHOT_LEN],
}

impl Default for Monitor {
    fn default() -> Self {
        Monitor::new()
    }
}

impl Monitor {
    pub fn new() -> Self {
        Monitor {
            peak: AtomicF32::new(0.0),
            active: AtomicBool::new(false),
            snapshot: std::array::from_fn(|_| AtomicF32::new(0.0)),
        }
    }

    /// Publish one rendered block. `hold` keeps the activity flag raised
    /// even when the block itself is quiet.
    pub fn publish(&self, block: &[f32], hold: bool) {
        let peak = block.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        self.peak.store(peak, Ordering::Relaxed);
        self.active.store(hold || peak > ACTIVITY_FLOOR, Ordering::Relaxed);

        // Keep the most recent SNAPSHOT_LEN samples, oldest first.
        let n = block.len().min(SNAPSHOT_LEN);
        let keep = SNAPSHOT_LEN - n;
        for i in 0..keep {
            let v = self.snapshot[i + n].load(Ordering::Relaxed);
            self.snapshot[i].store(v, Ordering::Relaxed);
        }
        for (slot, &s) in self.snapshot[keep..].iter().zip(&block[block.len() - n..]) {
            slot.store(s, Ordering::Relaxed);
        }
    }

    pub fn peak(&self) -> f32 {
        self.peak.load(Ordering::Relaxed)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> [f32; SNAPSHOT_LEN] {
        std::array::from_fn(|i| self.snapshot[i].load(Ordering::Relaxed))
    }
}
