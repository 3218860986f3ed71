//! Parameter morphing: user controls to smoothed physical parameters.
//!
//! Two layers:
//! - [`MorphMap`] (control domain): a single 0..1 "morph" scalar picks or
//!   interpolates named presets, each a `(tension, damping, excitation,
//!   material)` tuple plus a preferred excitation mode and trigger cadence.
//! - [`MorphEngine`] (render domain): one [`Smoother`] per parameter so every
//!   target change is approached exponentially, never jumped to.

use serde::{Deserialize, Serialize};

use crate::config::InitialParams;
use crate::phrase::{ExcitationRef, Phrase, PhraseEvent};

use super::exciter::ExciterMode;
use super::smoother::Smoother;
use super::string::{damping_to_feedback, tension_to_alpha};

/// The four semantic parameters, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MorphTargets {
    pub tension: f64,
    pub damping: f64,
    pub excitation: f64,
    pub material: f64,
}

impl MorphTargets {
    fn lerp(a: &MorphTargets, b: &MorphTargets, t: f64) -> MorphTargets {
        let mix = |x: f64, y: f64| x + (y - x) * t;
        MorphTargets {
            tension: mix(a.tension, b.tension),
            damping: mix(a.damping, b.damping),
            excitation: mix(a.excitation, b.excitation),
            material: mix(a.material, b.material),
        }
    }
}

/// A named point on the morph axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MorphPreset {
    pub name: String,
    /// Where on the 0..1 morph axis this preset sits.
    pub position: f64,
    pub targets: MorphTargets,
    pub mode: ExciterMode,
    /// Seconds between automatic triggers when this preset drives the scheduler.
    pub cadence_seconds: f64,
}

/// How the morph scalar moves between presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MorphStrategy {
    /// Switch to the nearest preset at the midpoint between neighbours.
    Snap,
    /// Linearly interpolate neighbouring presets.
    Interpolate,
}

/// Ordered preset table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MorphMap {
    presets: Vec<MorphPreset>,
    pub strategy: MorphStrategy,
}

impl Default for MorphMap {
    fn default() -> Self {
        MorphMap::new(
            vec![
                MorphPreset {
                    name: "muted percussive".to_string(),
                    position: 0.0,
                    targets: MorphTargets { tension: 0.3, damping: 0.9, excitation: 0.6, material: 0.2 },
                    mode: ExciterMode::Percussive,
                    cadence_seconds: 0.6,
                },
                MorphPreset {
                    name: "resonant metallic".to_string(),
                    position: 0.5,
                    targets: MorphTargets { tension: 0.9, damping: 0.2, excitation: 0.7, material: 0.8 },
                    mode: ExciterMode::Pulse,
                    cadence_seconds: 1.2,
                },
                MorphPreset {
                    name: "bowed sustained".to_string(),
                    position: 1.0,
                    targets: MorphTargets { tension: 0.6, damping: 0.4, excitation: 0.5, material: 0.6 },
                    mode: ExciterMode::Bow,
                    cadence_seconds: 4.0,
                },
            ],
            MorphStrategy::Interpolate,
        )
    }
}

impl MorphMap {
    /// Build a map; presets are sorted by position. An empty list falls back
    /// to the defaults.
    pub fn new(mut presets: Vec<MorphPreset>, strategy: MorphStrategy) -> Self {
        if presets.is_empty() {
            return MorphMap {
                strategy,
                ..MorphMap::default()
            };
        }
        presets.sort_by(|a, b| a.position.total_cmp(&b.position));
        MorphMap { presets, strategy }
    }

    pub fn presets(&self) -> &[MorphPreset] {
        &self.presets
    }

    /// Neighbouring presets around `morph` and the blend between them.
    fn bracket(&self, morph: f64) -> (&MorphPreset, &MorphPreset, f64) {
        let m = if morph.is_finite() { morph.clamp(0.0, 1.0) } else { 0.0 };
        let first = &self.presets[0];
        let last = &self.presets[self.presets.len() - 1];
        if m <= first.position {
            return (first, first, 0.0);
        }
        if m >= last.position {
            return (last, last, 0.0);
        }
        for pair in self.presets.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if m >= a.position && m <= b.position {
                let span = b.position - a.position;
                let t = if span > 0.0 { (m - a.position) / span } else { 0.0 };
                return (a, b, t);
            }
        }
        (last, last, 0.0)
    }

    /// The preset nearest to `morph`.
    pub fn preset_at(&self, morph: f64) -> &MorphPreset {
        let (a, b, t) = self.bracket(morph);
        if t < 0.5 { a } else { b }
    }

    /// Target parameters for a morph position under the map's strategy.
    pub fn resolve(&self, morph: f64) -> MorphTargets {
        match self.strategy {
            MorphStrategy::Snap => self.preset_at(morph).targets,
            MorphStrategy::Interpolate => {
                let (a, b, t) = self.bracket(morph);
                MorphTargets::lerp(&a.targets, &b.targets, t)
            }
        }
    }

    /// Excitation mode appropriate for this region of the morph axis.
    pub fn mode_at(&self, morph: f64) -> ExciterMode {
        self.preset_at(morph).mode
    }

    /// Trigger cadence in seconds (always interpolated so tempo glides).
    pub fn cadence_at(&self, morph: f64) -> f64 {
        let (a, b, t) = self.bracket(morph);
        a.cadence_seconds + (b.cadence_seconds - a.cadence_seconds) * t
    }

    /// A one-event self-looping phrase that plucks at the region's cadence.
    pub fn auto_phrase(&self, id: u32, morph: f64) -> Phrase {
        Phrase {
            id,
            base_period_seconds: self.cadence_at(morph).max(1e-3),
            events: vec![PhraseEvent {
                offset_seconds: 0.0,
                excitation: ExcitationRef {
                    mode: Some(self.mode_at(morph)),
                    intensity: 1.0,
                    pitch: None,
                },
            }],
        }
    }
}

/// Physical parameters handed to the voice, exciter and body each sample.
#[derive(Debug, Clone, Copy)]
pub struct PhysicalParams {
    pub alpha: f64,
    pub feedback: f64,
    pub excitation: f64,
    pub material: f64,
    pub frequency: f64,
    pub detune: f64,
    pub decay: f64,
}

/// Smoothed parameter state living in the render domain.
#[derive(Debug, Clone)]
pub struct MorphEngine {
    pub tension: Smoother,
    pub damping: Smoother,
    pub excitation: Smoother,
    pub material: Smoother,
    pub frequency: Smoother,
    pub detune: Smoother,
    pub decay: Smoother,
}

impl MorphEngine {
    pub fn new(initial: &InitialParams, tau: f64, sample_rate: f64) -> Self {
        let s = |v: f64| Smoother::new(v, tau, sample_rate);
        MorphEngine {
            tension: s(initial.tension),
            damping: s(initial.damping),
            excitation: s(initial.excitation),
            material: s(initial.material),
            frequency: s(initial.frequency),
            detune: s(initial.detune),
            decay: s(initial.decay),
        }
    }

    pub fn set_targets(&mut self, targets: &MorphTargets) {
        self.tension.set_target(targets.tension);
        self.damping.set_target(targets.damping);
        self.excitation.set_target(targets.excitation);
        self.material.set_target(targets.material);
    }

    /// Advance every smoother one step and derive the physical parameters.
    #[inline]
    pub fn next(&mut self) -> PhysicalParams {
        PhysicalParams {
            alpha: tension_to_alpha(self.tension.next()),
            feedback: damping_to_feedback(self.damping.next()),
            excitation: self.excitation.next(),
            material: self.material.next(),
            frequency: self.frequency.next(),
            detune: self.detune.next(),
            decay: self.decay.next(),
        }
    }
}
