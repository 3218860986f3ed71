//! DSP: render-domain audio synthesis and processing.
//!
//! Everything here runs inside the audio callback: no locks, no logging and
//! no allocation after construction. The same code powers the AudioWorklet
//! build (via WASM) and the offline WAV renderer.

pub mod body;
pub mod compressor;
pub mod delay;
pub mod engine;
pub mod envelope;
pub mod exciter;
pub mod filter;
pub mod mixer;
pub mod monitor;
pub mod morph;
pub mod renderer;
pub mod sampler;
pub mod smoother;
pub mod string;
pub mod tape;
