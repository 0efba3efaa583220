pub mod analysis;
pub mod buffer;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod playback;
pub mod transport;
pub mod wasm;

use wasm_bindgen::prelude::*;

pub use analysis::{
    InlineScheduler, MatchOutcome, MatchResult, Scheduler, SpectralEstimator, SpectrumProfile,
    compute_match, match_sources,
};
pub use buffer::{AudioBuffer, decode_audio, decode_with_fallback};
pub use config::{BandConfig, BandPreset, DeviceClass, EngineConfig};
pub use dsp::graph::{FilterGraph, PlaybackParams};
pub use engine::AudioEngine;
pub use error::{EngineError, Result};
pub use playback::{
    EngineEvent, MemoryStream, PlaybackMode, PlaybackState, Source, SourceStrategy, StreamHandle,
};
pub use transport::{
    KeepAliveTap, MediaAction, MediaPlaybackState, MediaSession, PlaybackListener,
    TransportBridge, TransportCommand,
};

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the tonematch-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed: derive mean-centered, clamped band gains that move
/// `source` toward `target`.
#[wasm_bindgen(js_name = computeMatch)]
pub fn compute_match_js(source: Vec<f32>, target: Vec<f32>) -> Vec<f32> {
    compute_match(&source, &target)
}
