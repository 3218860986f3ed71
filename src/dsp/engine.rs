//! String engine: the render-domain owner of one waveguide voice.
//!
//! [`StringEngine`] is driven by the audio callback through
//! [`render_block`](StringEngine::render_block). Everything else talks to it
//! through an [`EngineHandle`], which only ever writes atomics.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::{ConfigError, StringMorphError};
use crate::params::{Param, SharedControls};
use crate::phrase::PhraseEvent;
use crate::scheduler::{Fire, TriggerSink};

use super::body::BiquadFilterBank;
use super::exciter::{Exciter, ExciterMode};
use super::mixer::OutputStage;
use super::monitor::{Monitor, SNAPSHOT_LEN};
use super::morph::{MorphEngine, MorphMap, MorphTargets};
use super::string::{StringControls, StringVoice};

/// The synthesis engine. All buffers are allocated in [`new`](Self::new).
#[derive(Debug)]
pub struct StringEngine {
    config: EngineConfig,
    controls: Arc<SharedControls>,
    monitor: Arc<Monitor>,
    morph_map: Arc<MorphMap>,
    /// Last seen (trigger, release) sequence numbers.
    seen: (u32, u32),
    morph: MorphEngine,
    exciter: Exciter,
    voice: StringVoice,
    body: BiquadFilterBank,
    output: OutputStage,
    impulse: f64,
}

impl StringEngine {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        Self::with_morph_map(config, MorphMap::default())
    }

    pub fn with_morph_map(config: EngineConfig, morph_map: MorphMap) -> Result<Self, ConfigError> {
        config.validate()?;
        let sr = config.sample_rate;
        let controls = Arc::new(SharedControls::new(&config));

        let mut morph = MorphEngine::new(&config.initial, config.smoothing_seconds, sr);
        // Start from the clamped targets so nothing glides at startup.
        for (param, smoother) in [
            (Param::Tension, &mut morph.tension),
            (Param::Damping, &mut morph.damping),
            (Param::Excitation, &mut morph.excitation),
            (Param::Material, &mut morph.material),
            (Param::Frequency, &mut morph.frequency),
            (Param::Detune, &mut morph.detune),
            (Param::Decay, &mut morph.decay),
        ] {
            smoother.snap(controls.get(param));
        }

        let mut exciter = Exciter::new(sr);
        exciter.set_shape(config.initial.decay, config.initial.excitation);

        Ok(StringEngine {
            voice: StringVoice::new(sr, config.delay_capacity(), true, config.safety_limit),
            body: BiquadFilterBank::new(sr, &config.body_formants),
            output: OutputStage::new(config.dc_block_pole, config.output_drive, config.output_level),
            impulse: controls.get(Param::Impulse),
            controls,
            monitor: Arc::new(Monitor::new()),
            morph_map: Arc::new(morph_map),
            seen: (0, 0),
            morph,
            exciter,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> f64 {
        self.config.sample_rate
    }

    pub fn block_size(&self) -> usize {
        self.config.block_size
    }

    /// A control-domain handle sharing this engine's atomics.
    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            controls: Arc::clone(&self.controls),
            monitor: Arc::clone(&self.monitor),
            morph_map: Arc::clone(&self.morph_map),
        }
    }

    /// Pull control-domain state once for the coming block.
    fn apply_controls(&mut self) {
        let snap = self.controls.snapshot(&mut self.seen);

        self.morph.tension.set_target(snap.get(Param::Tension));
        self.morph.damping.set_target(snap.get(Param::Damping));
        self.morph.excitation.set_target(snap.get(Param::Excitation));
        self.morph.material.set_target(snap.get(Param::Material));
        self.morph.frequency.set_target(snap.get(Param::Frequency));
        self.morph.detune.set_target(snap.get(Param::Detune));
        self.morph.decay.set_target(snap.get(Param::Decay));
        self.impulse = snap.get(Param::Impulse);

        // Apply gate requests in the order they were made.
        if snap.release && !snap.released_last {
            self.exciter.release();
        }
        if let Some(request) = snap.trigger {
            // A pluck starts at its own pitch instead of gliding into it. Decay
            // only shapes a burst as it starts, so it snaps with the pitch.
            self.morph.frequency.snap(snap.get(Param::Frequency));
            self.morph.decay.snap(snap.get(Param::Decay));
            self.exciter.set_shape(self.morph.decay.current(), self.morph.excitation.current());
            let mode = request
                .mode
                .unwrap_or_else(|| ExciterMode::from_impulse(self.impulse));
            self.exciter.trigger(mode, request.intensity);
        }
        if snap.release && snap.released_last {
            self.exciter.release();
        }
    }

    /// Fill `out` with the next `out.len()` samples. Never allocates.
    pub fn render_block(&mut self, out: &mut [f32]) {
        self.apply_controls();

        for sample in out.iter_mut() {
            let p = self.morph.next();
            self.exciter.set_shape(p.decay, p.excitation);
            let force = self.exciter.next_sample(self.voice.last_output());
            let string = self.voice.next_sample(
                force,
                &StringControls {
                    frequency: p.frequency,
                    alpha: p.alpha,
                    feedback: p.feedback,
                    detune: p.detune,
                },
            );
            let body = self.body.process(string, p.material);
            *sample = self.output.process(body) as f32;
        }

        self.monitor.publish(out, self.exciter.is_active());
    }

    /// Render `num_samples` in `block_size` chunks into a new buffer.
    pub fn render(&mut self, num_samples: usize) -> Vec<f32> {
        let mut out = vec![0.0_f32; num_samples];
        let block = self.config.block_size;
        for chunk in out.chunks_mut(block) {
            self.render_block(chunk);
        }
        out
    }

    /// Clear all audio state (string, body, output). Parameters are kept.
    pub fn reset(&mut self) {
        self.voice.clear();
        self.body.reset();
        self.output.reset();
    }
}

/// Build an engine at `sample_rate` with every other setting at its default.
pub fn init(sample_rate: f64) -> Result<StringEngine, ConfigError> {
    StringEngine::new(EngineConfig::with_sample_rate(sample_rate))
}

/// Control-domain access to a running [`StringEngine`]. Cheap to clone and
/// safe to move to another thread.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    controls: Arc<SharedControls>,
    monitor: Arc<Monitor>,
    morph_map: Arc<MorphMap>,
}

impl EngineHandle {
    /// Set a parameter target, clamped into its range. Returns the stored value.
    pub fn set(&self, param: Param, value: f64) -> f64 {
        self.controls.set(param, value)
    }

    /// Set a parameter by name.
    pub fn set_parameter(&self, name: &str, value: f64) -> Result<f64, StringMorphError> {
        let param: Param = name.parse()?;
        Ok(self.set(param, value))
    }

    pub fn get(&self, param: Param) -> f64 {
        self.controls.get(param)
    }

    /// Drive tension, damping, excitation and material from the morph axis.
    pub fn set_morph(&self, morph: f64) -> MorphTargets {
        let targets = self.morph_map.resolve(morph);
        self.set(Param::Tension, targets.tension);
        self.set(Param::Damping, targets.damping);
        self.set(Param::Excitation, targets.excitation);
        self.set(Param::Material, targets.material);
        targets
    }

    pub fn morph_map(&self) -> &MorphMap {
        &self.morph_map
    }

    /// Raise the gate. `None` lets the `impulse` control choose the mode.
    pub fn trigger(&self, mode: Option<ExciterMode>, intensity: f64) {
        self.controls.trigger(mode, intensity);
    }

    pub fn release(&self) {
        self.controls.release();
    }

    /// True while the last block was audible or the exciter was still pushing.
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

impl TriggerSink for EngineHandle {
    fn fire(&mut self, _fire: &Fire, event: &PhraseEvent) {
        if let Some(frequency) = event.excitation.frequency() {
            self.set(Param::Frequency, frequency);
        }
        self.trigger(event.excitation.mode, event.excitation.intensity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 48000.0;

    fn rms(v: &[f32]) -> f64 {
        if v.is_empty() {
            return 0.0;
        }
        (v.iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>() / v.len() as f64).sqrt()
    }

    #[test]
    fn init_rejects_bad_sample_rate() {
        assert!(matches!(init(0.0), Err(ConfigError::InvalidSampleRate(_))));
        assert!(matches!(init(-1.0), Err(ConfigError::InvalidSampleRate(_))));
        assert!(init(44100.0).is_ok());
    }

    #[test]
    fn init_accepts_any_positive_sample_rate() {
        let mut engine = init(200.0).unwrap();
        let handle = engine.handle();
        handle.trigger(Some(ExciterMode::Percussive), 1.0);
        let out = engine.render(400);
        assert!(out.iter().all(|s| s.is_finite() && s.abs() <= 0.6 + 1e-6));
    }

    #[test]
    fn silent_without_trigger() {
        let mut engine = init(SR).unwrap();
        let out = engine.render(48000);
        assert!(out.iter().all(|&s| s == 0.0));
        assert!(!engine.handle().is_active());
    }

    #[test]
    fn plucked_note_decays_within_a_second() {
        let mut engine = init(SR).unwrap();
        let handle = engine.handle();
        handle.set(Param::Frequency, 261.63);
        handle.set(Param::Tension, 0.85);
        handle.set(Param::Damping, 0.95);
        handle.trigger(Some(ExciterMode::Percussive), 1.0);

        let out = engine.render(48000);
        let early = rms(&out[..480]);
        let late = rms(&out[40000..48000]);
        assert!(early > 0.0, "pluck should be audible");
        assert!(early > late, "early rms {early} should exceed late rms {late}");
        assert!(out.iter().all(|s| s.abs() <= 0.6 + 1e-6));
    }

    #[test]
    fn free_decay_is_monotonic_across_pitches() {
        for frequency in [55.0, 110.0, 261.63, 440.0, 880.0] {
            let mut engine = init(SR).unwrap();
            let handle = engine.handle();
            handle.set(Param::Frequency, frequency);
            handle.set(Param::Tension, 0.9);
            handle.set(Param::Damping, 0.8);
            handle.set(Param::Detune, 0.0);
            // Let every smoother settle before exciting the string.
            engine.render(48000);

            handle.trigger(Some(ExciterMode::Percussive), 1.0);
            engine.render(9600);
            let tail = engine.render(48000 * 3);

            let windows: Vec<f64> = tail.chunks(9600).map(rms).collect();
            for pair in windows.windows(2) {
                assert!(
                    pair[1] <= pair[0] * 1.02,
                    "{frequency} Hz: rms rose from {} to {}",
                    pair[0],
                    pair[1]
                );
            }
            let first = windows[0];
            let last = windows[windows.len() - 1];
            assert!(first > 0.0, "{frequency} Hz: no energy");
            assert!(last < first * 0.9, "{frequency} Hz: {first} -> {last}");
            assert!(tail.iter().all(|s| s.is_finite() && s.abs() <= 0.6 + 1e-6));
        }
    }

    fn engine_time_to_silence(decay: f64) -> usize {
        let mut engine = init(SR).unwrap();
        let handle = engine.handle();
        handle.set(Param::Tension, 0.2);
        handle.set(Param::Damping, 0.95);
        handle.set(Param::Decay, decay);
        handle.trigger(Some(ExciterMode::Percussive), 1.0);
        let out = engine.render(48000 * 2);
        out.iter().rposition(|s| s.abs() > 1e-3).unwrap_or(0)
    }

    #[test]
    fn longer_decay_rings_longer() {
        let short = engine_time_to_silence(0.1);
        let long = engine_time_to_silence(0.9);
        assert!(short < long, "decay 0.1 went silent at {short}, decay 0.9 at {long}");
    }

    #[test]
    fn set_parameter_by_name_clamps() {
        let engine = init(SR).unwrap();
        let handle = engine.handle();
        assert_eq!(handle.set_parameter("tension", 2.0).unwrap(), 1.0);
        assert_eq!(handle.set_parameter("frequency", 5.0).unwrap(), 20.0);
        assert!(matches!(
            handle.set_parameter("volume", 0.5),
            Err(StringMorphError::UnknownParameter(_))
        ));
    }

    #[test]
    fn morph_sets_four_targets() {
        let engine = init(SR).unwrap();
        let handle = engine.handle();
        let targets = handle.set_morph(1.0);
        assert!((handle.get(Param::Tension) - targets.tension).abs() < 1e-6);
        assert!((handle.get(Param::Damping) - targets.damping).abs() < 1e-6);
        assert!((handle.get(Param::Material) - targets.material).abs() < 1e-6);
    }

    #[test]
    fn bow_sustains_until_release() {
        let mut engine = init(SR).unwrap();
        let handle = engine.handle();
        handle.set(Param::Impulse, 1.0);
        handle.trigger(None, 1.0);
        engine.render(48000);
        let held = rms(&engine.render(4800));
        assert!(held > 1e-4, "bowed string should keep sounding, rms {held}");

        handle.release();
        engine.render(48000 * 3);
        let after = rms(&engine.render(4800));
        assert!(after < held * 0.1, "release should let the string die: {held} -> {after}");
    }

    #[test]
    fn tap_inside_one_block_still_plucks() {
        let mut engine = init(SR).unwrap();
        let handle = engine.handle();
        handle.trigger(Some(ExciterMode::Percussive), 1.0);
        handle.release();
        let out = engine.render(24000);
        let peak = out.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        assert!(peak > 1e-3, "tap should be audible, peak {peak}");
    }

    #[test]
    fn bow_trigger_and_release_in_one_block_has_an_onset() {
        let mut engine = init(SR).unwrap();
        let handle = engine.handle();
        handle.trigger(Some(ExciterMode::Bow), 1.0);
        handle.release();
        let out = engine.render(24000);
        let peak = out.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        assert!(peak > 1e-4, "bow onset missing, peak {peak}");
    }

    #[test]
    fn release_then_trigger_restarts_the_bow() {
        let mut engine = init(SR).unwrap();
        let handle = engine.handle();
        handle.trigger(Some(ExciterMode::Bow), 1.0);
        engine.render(48000);
        let held = rms(&engine.render(4800));
        assert!(held > 1e-4, "bow not sounding, rms {held}");

        handle.release();
        handle.trigger(Some(ExciterMode::Bow), 1.0);
        engine.render(48000 * 3);
        let after = rms(&engine.render(4800));
        assert!(after > held * 0.5, "bow should keep sounding: {held} -> {after}");
    }

    #[test]
    fn excitation_glides_into_the_exciter() {
        let mut engine = init(SR).unwrap();
        let handle = engine.handle();
        handle.set(Param::Excitation, 0.0);
        handle.trigger(Some(ExciterMode::Bow), 1.0);
        engine.render(48000);
        assert!(engine.exciter.excitation() < 1e-3);

        handle.set(Param::Excitation, 1.0);
        let mut previous = engine.exciter.excitation();
        for _ in 0..8 {
            engine.render(128);
            let now = engine.exciter.excitation();
            // One 128-sample block is a small fraction of the 50 ms time constant.
            assert!(now > previous, "excitation stalled at {now}");
            assert!(now - previous < 0.06, "excitation jumped {previous} -> {now}");
            previous = now;
        }
        engine.render(48000);
        assert!(engine.exciter.excitation() > 0.99);
    }

    #[test]
    fn handle_fires_phrase_events_with_pitch() {
        let mut engine = init(SR).unwrap();
        let mut handle = engine.handle();
        let event = PhraseEvent {
            offset_seconds: 0.0,
            excitation: crate::phrase::ExcitationRef {
                mode: Some(ExciterMode::Pulse),
                intensity: 1.0,
                pitch: Some("A4".to_string()),
            },
        };
        let fire = Fire { time: 0.0, phrase: 1, cycle: 0, event_index: 0 };
        handle.fire(&fire, &event);
        assert!((handle.get(Param::Frequency) - 440.0).abs() < 1e-3);
        engine.render(1024);
        assert!(handle.is_active());
        assert!(handle.peak() > 0.0);
    }

    #[test]
    fn render_block_honours_length() {
        let mut engine = init(SR).unwrap();
        let mut block = [1.0_f32; 37];
        engine.render_block(&mut block);
        assert!(block.iter().all(|&s| s == 0.0));
    }
}
