//! Engine configuration — band layouts, device classes, and the fixed
//! constants that shape the signal graph and the spectral analysis.
//!
//! Everything here is either a compile-time constant or part of
//! [`EngineConfig`], which the host builds once (or loads from JSON) before
//! constructing the engine. None of it is runtime API surface.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

// ── Graph constants ─────────────────────────────────────────

/// Quality factor shared by every peaking band.
pub const BAND_Q: f64 = 1.4;
/// Lowest allowed band gain in dB.
pub const MIN_GAIN_DB: f32 = -12.0;
/// Highest allowed band gain in dB.
pub const MAX_GAIN_DB: f32 = 12.0;
/// Time constant used for every live parameter change (seconds).
pub const SMOOTHING_SECONDS: f64 = 0.01;
/// Length of the synthetic reverb impulse response (seconds).
pub const REVERB_SECONDS: f64 = 2.0;
/// Exponential decay rate of the impulse response envelope (−60 dB at the end).
pub const REVERB_DECAY: f64 = 6.9;
/// Seed for the impulse response noise, so every engine sounds the same.
pub const REVERB_SEED: u64 = 0x7e9a_11c3;
/// Longest echo delay the delay line can hold (seconds).
pub const MAX_ECHO_DELAY: f64 = 5.0;
/// Highest echo feedback gain; anything above rings forever.
pub const MAX_ECHO_FEEDBACK: f32 = 0.99;
/// Master gain headroom above unity.
pub const MAX_MASTER_GAIN: f32 = 1.5;
/// Fade used by `stop` when the caller does not pass one (seconds).
pub const DEFAULT_FADE_SECONDS: f64 = 0.1;
/// Frames rendered per graph block.
pub const RENDER_QUANTUM: usize = 128;

// ── Analysis constants ──────────────────────────────────────

/// Partial-DFT window length in frames.
pub const ANALYSIS_WINDOW: usize = 4096;
/// Only the first part of a track is analysed (seconds).
pub const ANALYSIS_MAX_SECONDS: f64 = 30.0;
/// Floor added before the dB conversion so silence never produces `-inf`.
pub const DB_EPSILON: f64 = 1e-10;

// ── Playback constants ──────────────────────────────────────

/// Payload size above which constrained devices stream instead of decoding.
pub const STREAMING_THRESHOLD_BYTES: usize = 4 * 1024 * 1024;
/// The one bundled asset that may fall back to a synthetic tone when it
/// fails to decode.
pub const FALLBACK_ASSET_ID: &str = "builtin:demo-tone";

/// Octave-spaced 10-band layout.
pub const TEN_BAND_FREQUENCIES: [f32; 10] = [
    31.25, 62.5, 125.0, 250.0, 500.0, 1_000.0, 2_000.0, 4_000.0, 8_000.0, 16_000.0,
];

/// ISO third-octave 31-band layout.
pub const THIRTY_ONE_BAND_FREQUENCIES: [f32; 31] = [
    20.0, 25.0, 31.5, 40.0, 50.0, 63.0, 80.0, 100.0, 125.0, 160.0, 200.0, 250.0, 315.0, 400.0,
    500.0, 630.0, 800.0, 1_000.0, 1_250.0, 1_600.0, 2_000.0, 2_500.0, 3_150.0, 4_000.0, 5_000.0,
    6_300.0, 8_000.0, 10_000.0, 12_500.0, 16_000.0, 20_000.0,
];

// ── Band layout ─────────────────────────────────────────────

/// Which band layout the engine is built with.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BandPreset {
    #[default]
    TenBand,
    ThirtyOneBand,
    Custom(Vec<f32>),
}

/// Ordered, immutable list of band center frequencies.
///
/// Fixes the length and order of every per-band array in the engine: the
/// graph's filters, spectrum profiles, and match results.
#[derive(Debug, Clone, PartialEq)]
pub struct BandConfig {
    frequencies: Arc<[f32]>,
}

impl BandConfig {
    /// Build a band layout, rejecting empty lists and non-positive or
    /// non-finite frequencies.
    pub fn new(frequencies: &[f32]) -> Result<Self> {
        if frequencies.is_empty() {
            return Err(EngineError::InvalidConfig("band list is empty".into()));
        }
        if let Some(bad) = frequencies.iter().find(|f| !f.is_finite() || **f <= 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "band frequency {bad} is not a positive number"
            )));
        }
        Ok(BandConfig {
            frequencies: frequencies.into(),
        })
    }

    pub fn ten_band() -> Self {
        BandConfig {
            frequencies: TEN_BAND_FREQUENCIES.as_slice().into(),
        }
    }

    pub fn thirty_one_band() -> Self {
        BandConfig {
            frequencies: THIRTY_ONE_BAND_FREQUENCIES.as_slice().into(),
        }
    }

    pub fn from_preset(preset: &BandPreset) -> Result<Self> {
        match preset {
            BandPreset::TenBand => Ok(Self::ten_band()),
            BandPreset::ThirtyOneBand => Ok(Self::thirty_one_band()),
            BandPreset::Custom(freqs) => Self::new(freqs),
        }
    }

    pub fn frequencies(&self) -> &[f32] {
        &self.frequencies
    }

    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }
}

// ── Device class ────────────────────────────────────────────

/// Host capability class. Constrained devices analyse less, stream large
/// payloads, and keep the loopback tap audible so the OS does not suspend
/// a backgrounded page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    #[default]
    Desktop,
    Mobile,
}

impl DeviceClass {
    pub fn is_constrained(self) -> bool {
        matches!(self, DeviceClass::Mobile)
    }

    /// Analysis density for the spectral estimator.
    pub fn analysis(self) -> AnalysisConfig {
        match self {
            DeviceClass::Desktop => AnalysisConfig {
                samples: 16,
                stride: 2,
                yield_every_bands: None,
                window: ANALYSIS_WINDOW,
                max_seconds: ANALYSIS_MAX_SECONDS,
            },
            DeviceClass::Mobile => AnalysisConfig {
                samples: 6,
                stride: 8,
                yield_every_bands: Some(4),
                window: ANALYSIS_WINDOW,
                max_seconds: ANALYSIS_MAX_SECONDS,
            },
        }
    }

    /// Pause between two back-to-back spectrum estimations.
    pub fn cooldown(self) -> Duration {
        match self {
            DeviceClass::Desktop => Duration::from_millis(100),
            DeviceClass::Mobile => Duration::from_millis(500),
        }
    }

    /// Payload size above which this device should stream rather than decode.
    pub fn streaming_threshold_bytes(self) -> Option<usize> {
        match self {
            DeviceClass::Desktop => None,
            DeviceClass::Mobile => Some(STREAMING_THRESHOLD_BYTES),
        }
    }
}

/// Sampling density of the spectral estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisConfig {
    /// Number of time offsets sampled across the analysis span.
    pub samples: usize,
    /// Only every `stride`-th frame inside a window is accumulated.
    pub stride: usize,
    /// Extra suspension point every this many bands (constrained devices).
    pub yield_every_bands: Option<usize>,
    /// Window length in frames.
    pub window: usize,
    /// Analysis span limit in seconds.
    pub max_seconds: f64,
}

// ── Engine configuration ────────────────────────────────────

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Processing context sample rate in Hz.
    pub sample_rate: f64,
    /// Band layout.
    pub bands: BandPreset,
    /// Host capability class.
    pub device: DeviceClass,
    /// Whether the echo stage is part of the graph.
    pub echo_enabled: bool,
    /// FFT size of the visualizer tap (power of two).
    pub analyser_fft_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            sample_rate: 44_100.0,
            bands: BandPreset::TenBand,
            device: DeviceClass::Desktop,
            echo_enabled: true,
            analyser_fft_size: 256,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON configuration. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| EngineError::InvalidConfig(format!("config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "sample rate {} is not positive",
                self.sample_rate
            )));
        }
        let bands = self.band_config()?;
        let nyquist = (self.sample_rate / 2.0) as f32;
        if let Some(f) = bands.frequencies().iter().find(|f| **f >= nyquist) {
            return Err(EngineError::InvalidConfig(format!(
                "band {f} Hz is at or above Nyquist ({nyquist} Hz)"
            )));
        }
        if !self.analyser_fft_size.is_power_of_two() || self.analyser_fft_size < 32 {
            return Err(EngineError::InvalidConfig(format!(
                "analyser FFT size {} must be a power of two >= 32",
                self.analyser_fft_size
            )));
        }
        Ok(())
    }

    pub fn band_config(&self) -> Result<BandConfig> {
        BandConfig::from_preset(&self.bands)
    }
}

/// Clamp a band gain into the allowed range. NaN maps to 0 dB.
pub fn clamp_gain_db(db: f32) -> f32 {
    if db.is_nan() {
        0.0
    } else {
        db.clamp(MIN_GAIN_DB, MAX_GAIN_DB)
    }
}

/// Clamp a level into `[0, max]`. NaN maps to 0.
pub fn clamp_level(level: f32, max: f32) -> f32 {
    if level.is_nan() { 0.0 } else { level.clamp(0.0, max) }
}
