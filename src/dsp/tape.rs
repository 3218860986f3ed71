//! Tape deck: the sample-playback sink for phrase triggers.
//!
//! Each loaded loop is keyed by phrase id. A trigger starts a free voice on
//! that loop; all voices sum into a master bus of gain, a timbre-controlled
//! low-pass and a compressor.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use atomic_float::AtomicF32;
use tracing::debug;

use crate::assets::{LoadReport, SampleProvider, load_all};
use crate::config::TapeDeckConfig;
use crate::error::ConfigError;
use crate::phrase::{PhraseEvent, PhraseId};
use crate::scheduler::{Fire, TriggerSink};

use super::compressor::Compressor;
use super::filter::{BiquadFilter, FilterType};
use super::mixer::Mixer;
use super::monitor::{Monitor, SNAPSHOT_LEN};
use super::sampler::{SampleBuffer, TapeVoice};
use super::smoother::Smoother;

const TIMBRE_SMOOTHING_SECONDS: f64 = 0.1;
/// Samples between low-pass coefficient updates while timbre glides.
const CONTROL_INTERVAL: usize = 16;

/// Low-pass cutoff for a timbre setting.
pub fn cutoff_for(timbre: f64) -> f64 {
    200.0 + timbre.clamp(0.0, 1.0) * 6000.0
}

/// Low-pass resonance for a timbre setting.
pub fn q_for(timbre: f64) -> f64 {
    (timbre.clamp(0.0, 1.0) * 5.0).max(0.707)
}

/// Playback-rate multiplier for a timbre setting.
pub fn rate_for(timbre: f64) -> f64 {
    0.98 + timbre.clamp(0.0, 1.0) * 0.04
}

#[derive(Debug)]
struct TapeShared {
    /// Loaded loop ids, sorted; `triggers[i]` belongs to `ids[i]`.
    ids: Vec<PhraseId>,
    triggers: Vec<AtomicU32>,
    timbre: AtomicF32,
}

impl TapeShared {
    fn slot(&self, id: PhraseId) -> Option<usize> {
        self.ids.binary_search(&id).ok()
    }
}

#[derive(Debug)]
pub struct TapeDeck {
    config: TapeDeckConfig,
    sample_rate: f64,
    loops: Vec<SampleBuffer>,
    seen: Vec<u32>,
    voices: Vec<TapeVoice>,
    mixer: Mixer,
    lowpass: BiquadFilter,
    compressor: Compressor,
    timbre: Smoother,
    fade_samples: usize,
    hold_samples: usize,
    hold_remaining: usize,
    control_counter: usize,
    shared: Arc<TapeShared>,
    monitor: Arc<Monitor>,
}

impl TapeDeck {
    /// Load `ids` from `provider`. Missing assets are listed in the report;
    /// the deck plays whatever did load.
    pub fn load(
        config: TapeDeckConfig,
        sample_rate: f64,
        provider: &mut dyn SampleProvider,
        ids: &[PhraseId],
    ) -> Result<(Self, LoadReport), ConfigError> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(ConfigError::InvalidSampleRate(sample_rate));
        }
        if config.max_block == 0 {
            return Err(ConfigError::InvalidBlockSize(config.max_block));
        }

        let (buffers, report) = load_all(provider, ids);
        let (ids, loops): (Vec<PhraseId>, Vec<SampleBuffer>) = buffers.into_iter().unzip();
        let timbre = config.timbre.clamp(0.0, 1.0);

        let shared = Arc::new(TapeShared {
            triggers: ids.iter().map(|_| AtomicU32::new(0)).collect(),
            ids,
            timbre: AtomicF32::new(timbre as f32),
        });
        let mut mixer = Mixer::new(config.max_block);
        mixer.master_gain = config.master_gain;

        let deck = TapeDeck {
            seen: vec![0; loops.len()],
            loops,
            voices: vec![TapeVoice::new(); config.max_voices.max(1)],
            mixer,
            lowpass: BiquadFilter::with_params(FilterType::Lowpass, sample_rate, cutoff_for(timbre), q_for(timbre)),
            compressor: Compressor::from_config(sample_rate, &config),
            timbre: Smoother::new(timbre, TIMBRE_SMOOTHING_SECONDS, sample_rate),
            fade_samples: (config.fade_in_seconds * sample_rate).max(1.0) as usize,
            hold_samples: (config.activity_hold_seconds * sample_rate).max(0.0) as usize,
            hold_remaining: 0,
            control_counter: 0,
            shared,
            monitor: Arc::new(Monitor::new()),
            sample_rate,
            config,
        };
        Ok((deck, report))
    }

    pub fn config(&self) -> &TapeDeckConfig {
        &self.config
    }

    pub fn loaded_ids(&self) -> &[PhraseId] {
        &self.shared.ids
    }

    pub fn handle(&self) -> TapeDeckHandle {
        TapeDeckHandle {
            shared: Arc::clone(&self.shared),
            monitor: Arc::clone(&self.monitor),
        }
    }

    pub fn playing_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.is_playing()).count()
    }

    /// A free voice, or the one furthest through its loop.
    fn allocate_voice(&mut self) -> usize {
        if let Some(free) = self.voices.iter().position(|v| !v.is_playing()) {
            return free;
        }
        self.voices
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.progress().total_cmp(&b.1.progress()))
            .map_or(0, |(i, _)| i)
    }

    fn apply_controls(&mut self) {
        self.timbre
            .set_target(self.shared.timbre.load(Ordering::Relaxed) as f64);

        for slot in 0..self.loops.len() {
            let count = self.shared.triggers[slot].load(Ordering::Acquire);
            if count == self.seen[slot] {
                continue;
            }
            self.seen[slot] = count;
            let voice = self.allocate_voice();
            let rate = rate_for(self.timbre.current());
            self.voices[voice].start(
                &self.loops[slot],
                rate,
                self.sample_rate,
                self.config.voice_gain,
                self.fade_samples,
            );
            self.hold_remaining = self.hold_samples;
        }
    }

    fn update_filter(&mut self) {
        let timbre = self.timbre.current();
        self.lowpass.set_frequency(cutoff_for(timbre));
        self.lowpass.set_q(q_for(timbre));
    }

    /// Fill `out` with the next block of master-bus output.
    pub fn render_block(&mut self, out: &mut [f32]) {
        self.apply_controls();

        let chunk_len = self.config.max_block;
        for chunk in out.chunks_mut(chunk_len) {
            self.mixer.clear(chunk.len());
            for voice in self.voices.iter_mut().filter(|v| v.is_playing()) {
                for i in 0..chunk.len() {
                    self.mixer.add(i, voice.next_sample());
                }
            }
            for (i, sample) in chunk.iter_mut().enumerate() {
                self.timbre.next();
                if self.control_counter == 0 {
                    self.update_filter();
                }
                self.control_counter = (self.control_counter + 1) % CONTROL_INTERVAL;

                let y = self.lowpass.process(self.mixer.get(i));
                *sample = self.compressor.process(y) as f32;
            }
        }

        self.hold_remaining = self.hold_remaining.saturating_sub(out.len());
        self.monitor.publish(out, self.hold_remaining > 0);
    }
}

/// Control-domain access to a [`TapeDeck`].
#[derive(Debug, Clone)]
pub struct TapeDeckHandle {
    shared: Arc<TapeShared>,
    monitor: Arc<Monitor>,
}

impl TapeDeckHandle {
    /// Start the loop for `id`. Returns false (and does nothing) when no
    /// asset is loaded for it.
    pub fn trigger(&self, id: PhraseId) -> bool {
        match self.shared.slot(id) {
            Some(slot) => {
                self.shared.triggers[slot].fetch_add(1, Ordering::Release);
                true
            }
            None => {
                debug!(phrase = id, "no loop loaded, trigger ignored");
                false
            }
        }
    }

    /// Timbre in `[0, 1]`: filter brightness and playback-rate shift.
    pub fn set_timbre(&self, timbre: f64) -> f64 {
        let t = if timbre.is_nan() { 0.0 } else { timbre.clamp(0.0, 1.0) };
        self.shared.timbre.store(t as f32, Ordering::Relaxed);
        t
    }

    pub fn is_active(&self) -> bool {
        self.monitor.is_active()
    }

    pub fn peak(&self) -> f32 {
        self.monitor.peak()
    }

    pub fn waveform(&self) -> [f32; SNAPSHOT_LEN] {
        self.monitor.snapshot()
    }
}

impl TriggerSink for TapeDeckHandle {
    fn fire(&mut self, fire: &Fire, _event: &PhraseEvent) {
        self.trigger(fire.phrase);
    }
}
