pub mod assets;
pub mod config;
pub mod dsp;
pub mod error;
pub mod params;
pub mod phrase;
pub mod pitch;
pub mod scheduler;

pub use crate::config::{EngineConfig, TapeDeckConfig};
pub use crate::dsp::engine::{EngineHandle, StringEngine, init};
pub use crate::dsp::exciter::ExciterMode;
pub use crate::error::StringMorphError;
pub use crate::params::Param;
pub use crate::phrase::{Phrase, PhraseEvent, airports};
pub use crate::scheduler::{LoopPhasingScheduler, StaggerPolicy, TriggerSink};

use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// WASM-exposed: return the stringmorph-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed: parse and validate phrase JSON into plain JS objects.
/// Errors carry a rendered diagnostic pointing into the source.
#[wasm_bindgen]
pub fn parse_phrases(json: &str) -> Result<JsValue, JsValue> {
    let phrases = phrase::parse_phrases(json).map_err(|e| JsValue::from_str(&e.report(json)))?;
    serde_wasm_bindgen::to_value(&phrases).map_err(js_error)
}

/// WASM-exposed: render phrase JSON through the string engine to WAV bytes.
/// Stagger is linear with `stagger_seconds` between phrase starts.
#[wasm_bindgen]
pub fn render_phrases_wav(
    json: &str,
    sample_rate: f64,
    seconds: f64,
    stagger_seconds: f64,
) -> Result<Vec<u8>, JsValue> {
    let phrases = phrase::parse_phrases(json).map_err(|e| JsValue::from_str(&e.report(json)))?;
    dsp::renderer::render_phrases_wav(
        EngineConfig::with_sample_rate(sample_rate),
        phrases,
        StaggerPolicy::Linear { step_seconds: stagger_seconds },
        seconds,
    )
    .map_err(js_error)
}

/// WASM-exposed engine for an AudioWorklet: one string voice plus its own
/// phrase scheduler clocked by the rendered sample count.
#[wasm_bindgen]
pub struct WasmStringEngine {
    engine: StringEngine,
    handle: EngineHandle,
    scheduler: LoopPhasingScheduler,
    samples_rendered: u64,
}

#[wasm_bindgen]
impl WasmStringEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(sample_rate: f64) -> Result<WasmStringEngine, JsValue> {
        let engine = init(sample_rate).map_err(js_error)?;
        Ok(WasmStringEngine {
            handle: engine.handle(),
            engine,
            scheduler: LoopPhasingScheduler::new(),
            samples_rendered: 0,
        })
    }

    /// Build from a JSON `EngineConfig`; absent fields take defaults.
    pub fn from_config(json: &str) -> Result<WasmStringEngine, JsValue> {
        let config = EngineConfig::from_json(json).map_err(js_error)?;
        let engine = StringEngine::new(config).map_err(js_error)?;
        Ok(WasmStringEngine {
            handle: engine.handle(),
            engine,
            scheduler: LoopPhasingScheduler::new(),
            samples_rendered: 0,
        })
    }

    /// Returns the value actually applied after clamping.
    pub fn set_parameter(&self, name: &str, value: f64) -> Result<f64, JsValue> {
        self.handle.set_parameter(name, value).map_err(js_error)
    }

    pub fn set_morph(&self, morph: f64) {
        self.handle.set_morph(morph);
    }

    /// `mode` is one of percussive/shaped/pulse/bow, or absent to use `impulse`.
    pub fn trigger(&self, mode: Option<String>, intensity: f64) -> Result<(), JsValue> {
        let mode = match mode {
            Some(name) => Some(
                name.parse::<ExciterMode>()
                    .map_err(|n| js_error(StringMorphError::UnknownMode(n)))?,
            ),
            None => None,
        };
        self.handle.trigger(mode, intensity);
        Ok(())
    }

    pub fn release(&self) {
        self.handle.release();
    }

    /// Replace the phrase library with phrase JSON (all phrases stopped).
    pub fn load_phrases(&mut self, json: &str) -> Result<usize, JsValue> {
        let phrases = phrase::parse_phrases(json).map_err(|e| JsValue::from_str(&e.report(json)))?;
        let count = phrases.len();
        self.scheduler = LoopPhasingScheduler::with_phrases(phrases).map_err(js_error)?;
        Ok(count)
    }

    pub fn engage_all(&mut self, stagger_seconds: f64) {
        let now = self.now();
        self.scheduler
            .engage_all(StaggerPolicy::Linear { step_seconds: stagger_seconds }, now);
    }

    pub fn silence_all(&mut self) {
        self.scheduler.silence_all();
    }

    /// Cycle progress of a phrase in `[0, 1)`, or -1 when it is not armed.
    pub fn progress(&self, id: u32) -> f64 {
        self.scheduler.progress(id, self.now()).unwrap_or(-1.0)
    }

    /// Render the next block into `out`, firing due phrase events first.
    pub fn process(&mut self, out: &mut [f32]) {
        let now = self.now();
        self.scheduler.advance_to(now, &mut self.handle);
        self.engine.render_block(out);
        self.samples_rendered += out.len() as u64;
    }

    /// Render `num_samples` and return them.
    pub fn render(&mut self, num_samples: usize) -> Vec<f32> {
        let mut out = vec![0.0_f32; num_samples];
        let block = self.engine.block_size();
        for chunk in out.chunks_mut(block) {
            self.process(chunk);
        }
        out
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_active()
    }

    pub fn peak(&self) -> f32 {
        self.handle.peak()
    }

    pub fn waveform(&self) -> Vec<f32> {
        self.handle.waveform().to_vec()
    }
}

impl WasmStringEngine {
    /// Scheduler clock: seconds of audio rendered so far.
    fn now(&self) -> f64 {
        self.samples_rendered as f64 / self.engine.sample_rate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worklet_engine_fires_loaded_phrases() {
        let mut engine = WasmStringEngine::new(16000.0).unwrap_or_else(|_| panic!("engine"));
        let json = r#"[{ "id": 1, "basePeriodSeconds": 0.5, "events": [{ "offsetSeconds": 0.1, "pitch": "A3" }] }]"#;
        assert_eq!(engine.load_phrases(json).unwrap_or_else(|_| panic!("phrases")), 1);
        assert_eq!(engine.progress(1), -1.0);

        engine.engage_all(0.0);
        let early = engine.render(1500);
        assert!(early.iter().all(|&s| s == 0.0));
        let later = engine.render(8000);
        assert!(later.iter().any(|&s| s.abs() > 1e-3));
        assert!(engine.progress(1) >= 0.0);
    }

    #[test]
    fn version_matches_manifest() {
        assert_eq!(core_version(), env!("CARGO_PKG_VERSION"));
    }
}
