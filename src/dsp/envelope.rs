//! Burst envelope: short attack/exponential-release shape for excitation bursts.

/// Envelope stages.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    Idle,
    Attack,
    Release,
}

/// Level below which a releasing burst is considered finished.
const SILENCE_FLOOR: f64 = 1e-4;

/// Attack-then-exponential-release envelope used to shape one burst.
///
/// Re-triggering while a burst is still sounding restarts the attack from the
/// current level instead of from zero, so the injected signal stays continuous.
#[derive(Debug, Clone)]
pub struct BurstEnvelope {
    /// Attack time in seconds.
    pub attack: f64,
    /// Release time constant in seconds (time to fall to 1/e).
    pub release: f64,

    stage: Stage,
    level: f64,
    sample_rate: f64,
    stage_samples: usize,
    stage_counter: usize,
    /// Level at the start of the current attack (for retrigger).
    start_level: f64,
    release_coef: f64,
}

impl BurstEnvelope {
    pub fn new(sample_rate: f64) -> Self {
        BurstEnvelope {
            attack: 0.002,
            release: 0.02,
            stage: Stage::Idle,
            level: 0.0,
            sample_rate,
            stage_samples: 0,
            stage_counter: 0,
            start_level: 0.0,
            release_coef: 0.0,
        }
    }

    /// Start (or restart) a burst.
    pub fn trigger(&mut self) {
        self.stage = Stage::Attack;
        self.stage_samples = (self.attack * self.sample_rate) as usize;
        self.stage_counter = 0;
        self.start_level = self.level; // retrigger from current level
        let release_samples = (self.release * self.sample_rate).max(1.0);
        self.release_coef = (-1.0 / release_samples).exp();
    }

    /// Generate the next envelope sample [0, 1].
    #[inline]
    pub fn next_sample(&mut self) -> f64 {
        match self.stage {
            Stage::Idle => {
                self.level = 0.0;
            }
            Stage::Attack => {
                if self.stage_samples == 0 {
                    self.level = 1.0;
                    self.stage = Stage::Release;
                } else {
                    let t = self.stage_counter as f64 / self.stage_samples as f64;
                    self.level = self.start_level + (1.0 - self.start_level) * t;
                    self.stage_counter += 1;
                    if self.stage_counter >= self.stage_samples {
                        self.level = 1.0;
                        self.stage = Stage::Release;
                    }
                }
            }
            Stage::Release => {
                self.level *= self.release_coef;
                if self.level < SILENCE_FLOOR {
                    self.level = 0.0;
                    self.stage = Stage::Idle;
                }
            }
        }
        self.level
    }

    /// Returns true once the burst has decayed away.
    pub fn is_finished(&self) -> bool {
        self.stage == Stage::Idle
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    /// Samples a fresh burst lasts with the current attack/release settings.
    pub fn burst_length(&self) -> usize {
        let attack = (self.attack * self.sample_rate) as usize;
        let release = self.release * self.sample_rate * (1.0 / SILENCE_FLOOR).ln();
        attack + release.ceil() as usize
    }
}
