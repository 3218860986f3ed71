//! Settable parameters and the lock-free control-to-render handoff.
//!
//! The control domain writes targets into [`SharedControls`]; the render
//! domain reads them once per block. Every slot is a single atomic scalar,
//! so a block never sees a torn value. Trigger and release requests are
//! sequence counters: the render side compares against the last value it
//! saw, so a request issued between two blocks is never lost or doubled.
//! The kind of the latest request is kept too, so a block that sees both
//! knows which came last.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use atomic_float::AtomicF32;
use tracing::debug;

use crate::config::{EngineConfig, InitialParams};
use crate::dsp::exciter::ExciterMode;
use crate::error::StringMorphError;

/// Every parameter reachable through `set_parameter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Param {
    Tension,
    Damping,
    Excitation,
    Material,
    Frequency,
    Detune,
    Decay,
    Impulse,
}

impl Param {
    pub const COUNT: usize = 8;

    pub const ALL: [Param; Param::COUNT] = [
        Param::Tension,
        Param::Damping,
        Param::Excitation,
        Param::Material,
        Param::Frequency,
        Param::Detune,
        Param::Decay,
        Param::Impulse,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Param::Tension => "tension",
            Param::Damping => "damping",
            Param::Excitation => "excitation",
            Param::Material => "material",
            Param::Frequency => "frequency",
            Param::Detune => "detune",
            Param::Decay => "decay",
            Param::Impulse => "impulse",
        }
    }

    /// Documented `[min, max]`; frequency bounds come from the engine config.
    pub fn range(self, config: &EngineConfig) -> (f64, f64) {
        match self {
            Param::Frequency => (config.min_frequency, config.max_frequency),
            _ => (0.0, 1.0),
        }
    }

    fn initial(self, initial: &InitialParams) -> f64 {
        match self {
            Param::Tension => initial.tension,
            Param::Damping => initial.damping,
            Param::Excitation => initial.excitation,
            Param::Material => initial.material,
            Param::Frequency => initial.frequency,
            Param::Detune => initial.detune,
            Param::Decay => initial.decay,
            Param::Impulse => initial.impulse,
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Param {
    type Err = StringMorphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Param::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| StringMorphError::UnknownParameter(s.to_string()))
    }
}

/// Trigger mode slot value meaning "pick from the impulse control".
const MODE_FROM_IMPULSE: u8 = u8::MAX;

const EDGE_TRIGGER: u8 = 0;
const EDGE_RELEASE: u8 = 1;

/// A trigger or release request observed by the render domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateRequest {
    pub mode: Option<ExciterMode>,
    pub intensity: f64,
}

/// Block-rate snapshot of the control state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlSnapshot {
    pub values: [f64; Param::COUNT],
    pub trigger: Option<GateRequest>,
    pub release: bool,
    /// The most recent gate request was a release.
    pub released_last: bool,
}

impl ControlSnapshot {
    pub fn get(&self, param: Param) -> f64 {
        self.values[param.index()]
    }
}

/// Atomic parameter targets plus trigger/release sequence counters.
#[derive(Debug)]
pub struct SharedControls {
    targets: [AtomicF32; Param::COUNT],
    ranges: [(f64, f64); Param::COUNT],
    trigger_seq: AtomicU32,
    trigger_mode: AtomicU8,
    trigger_intensity: AtomicF32,
    release_seq: AtomicU32,
    last_edge: AtomicU8,
}

impl SharedControls {
    pub fn new(config: &EngineConfig) -> Self {
        let ranges = Param::ALL.map(|p| p.range(config));
        let targets = Param::ALL.map(|p| {
            let (lo, hi) = ranges[p.index()];
            AtomicF32::new(p.initial(&config.initial).clamp(lo, hi) as f32)
        });
        SharedControls {
            targets,
            ranges,
            trigger_seq: AtomicU32::new(0),
            trigger_mode: AtomicU8::new(MODE_FROM_IMPULSE),
            trigger_intensity: AtomicF32::new(1.0),
            release_seq: AtomicU32::new(0),
            last_edge: AtomicU8::new(EDGE_RELEASE),
        }
    }

    /// Store a new target, clamped into range. Returns the stored value.
    pub fn set(&self, param: Param, value: f64) -> f64 {
        let (lo, hi) = self.ranges[param.index()];
        let clamped = if value.is_nan() { lo } else { value.clamp(lo, hi) };
        if clamped != value {
            debug!(parameter = %param, requested = value, applied = clamped, "parameter clamped");
        }
        self.targets[param.index()].store(clamped as f32, Ordering::Relaxed);
        clamped
    }

    pub fn get(&self, param: Param) -> f64 {
        self.targets[param.index()].load(Ordering::Relaxed) as f64
    }

    /// Request a rising gate edge. `None` picks the mode from `impulse`.
    pub fn trigger(&self, mode: Option<ExciterMode>, intensity: f64) {
        let code = mode.map_or(MODE_FROM_IMPULSE, ExciterMode::as_u8);
        let intensity = if intensity.is_nan() { 0.0 } else { intensity.clamp(0.0, 1.0) };
        self.trigger_mode.store(code, Ordering::Relaxed);
        self.trigger_intensity.store(intensity as f32, Ordering::Relaxed);
        self.last_edge.store(EDGE_TRIGGER, Ordering::Relaxed);
        self.trigger_seq.fetch_add(1, Ordering::Release);
    }

    /// Request the gate ramp down.
    pub fn release(&self) {
        self.last_edge.store(EDGE_RELEASE, Ordering::Relaxed);
        self.release_seq.fetch_add(1, Ordering::Release);
    }

    /// Read everything once. `seen` holds the last observed
    /// `(trigger, release)` sequence numbers and is updated in place.
    pub fn snapshot(&self, seen: &mut (u32, u32)) -> ControlSnapshot {
        let trigger_seq = self.trigger_seq.load(Ordering::Acquire);
        let release_seq = self.release_seq.load(Ordering::Acquire);

        let trigger = (trigger_seq != seen.0).then(|| {
            let code = self.trigger_mode.load(Ordering::Relaxed);
            GateRequest {
                mode: (code != MODE_FROM_IMPULSE).then(|| ExciterMode::from_u8(code)),
                intensity: self.trigger_intensity.load(Ordering::Relaxed) as f64,
            }
        });
        let release = release_seq != seen.1;
        let released_last = self.last_edge.load(Ordering::Relaxed) == EDGE_RELEASE;
        *seen = (trigger_seq, release_seq);

        ControlSnapshot {
            values: Param::ALL.map(|p| self.get(p)),
            trigger,
            release,
            released_last,
        }
    }
}
