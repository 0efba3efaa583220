//! Filter graph — the fixed processing topology.
//!
//! ```text
//! input → band[0] → … → band[N-1] ─┬─ dry ─────────────┐
//!                                  └─ reverb → wet ────┴→ (echo) → master → analyser → out
//! ```
//!
//! Built once per engine. Parameters are mutated in place afterwards and
//! every control is smoothed with a ~10 ms time constant. Band coefficients
//! are recomputed once per render block from the smoothed gain.

use serde::{Deserialize, Serialize};

use super::analyser::Analyser;
use super::delay::Echo;
use super::filter::PeakingFilter;
use super::param::SmoothedParam;
use super::reverb::ConvolutionReverb;
use crate::config::{
    BAND_Q, BandConfig, EngineConfig, MAX_MASTER_GAIN, REVERB_DECAY, REVERB_SECONDS, REVERB_SEED,
    SMOOTHING_SECONDS, clamp_gain_db, clamp_level,
};
use crate::error::Result;

/// FX values applied when a session starts or seeks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackParams {
    pub volume: f32,
    pub band_gains: Vec<f32>,
    pub reverb_dry: f32,
    pub reverb_wet: f32,
}

impl PlaybackParams {
    /// Unity volume, flat bands, fully dry.
    pub fn flat(bands: usize) -> Self {
        PlaybackParams {
            volume: 1.0,
            band_gains: vec![0.0; bands],
            reverb_dry: 1.0,
            reverb_wet: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
struct Band {
    filter: PeakingFilter,
    gain: SmoothedParam,
}

#[derive(Debug)]
pub struct FilterGraph {
    bands: BandConfig,
    filters: Vec<Band>,
    dry: SmoothedParam,
    wet: SmoothedParam,
    reverb: ConvolutionReverb,
    /// Set while the reverb is bypassed at zero wet; its tail is stale.
    reverb_idle: bool,
    echo: Option<Echo>,
    master: SmoothedParam,
    analyser: Analyser,
}

impl FilterGraph {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let bands = config.band_config()?;
        let sr = config.sample_rate;
        let param = |v: f32| SmoothedParam::new(v, SMOOTHING_SECONDS, sr);

        let filters = bands
            .frequencies()
            .iter()
            .map(|&f| Band {
                filter: PeakingFilter::new(f as f64, BAND_Q, sr),
                gain: param(0.0),
            })
            .collect();

        log::info!(
            "building filter graph: {} bands @ {} Hz, echo {}",
            bands.len(),
            sr,
            if config.echo_enabled { "on" } else { "off" }
        );

        Ok(FilterGraph {
            bands,
            filters,
            dry: param(1.0),
            wet: param(0.0),
            reverb: ConvolutionReverb::new(sr, REVERB_SECONDS, REVERB_DECAY, REVERB_SEED),
            reverb_idle: true,
            echo: config.echo_enabled.then(|| Echo::new(sr)),
            master: param(1.0),
            analyser: Analyser::new(config.analyser_fft_size),
        })
    }

    pub fn band_config(&self) -> &BandConfig {
        &self.bands
    }

    // ── Mutators ────────────────────────────────────────────

    /// Set one band's gain, clamped to ±12 dB. Unknown indices are ignored.
    pub fn set_band_gain(&mut self, index: usize, db: f32) {
        if let Some(band) = self.filters.get_mut(index) {
            band.gain.set_target(clamp_gain_db(db));
        }
    }

    pub fn set_reverb_dry(&mut self, level: f32) {
        self.dry.set_target(clamp_level(level, 1.0));
    }

    pub fn set_reverb_wet(&mut self, level: f32) {
        self.wet.set_target(clamp_level(level, 1.0));
    }

    pub fn set_echo_delay(&mut self, seconds: f64) {
        if let Some(echo) = &mut self.echo {
            echo.set_delay_time(seconds);
        }
    }

    pub fn set_echo_feedback(&mut self, gain: f32) {
        if let Some(echo) = &mut self.echo {
            echo.set_feedback(gain);
        }
    }

    pub fn set_echo_dry(&mut self, level: f32) {
        if let Some(echo) = &mut self.echo {
            echo.set_dry(level);
        }
    }

    pub fn set_echo_wet(&mut self, level: f32) {
        if let Some(echo) = &mut self.echo {
            echo.set_wet(level);
        }
    }

    /// Master gain in `[0, 1.5]`.
    pub fn set_master_volume(&mut self, level: f32) {
        self.master.set_time_constant(SMOOTHING_SECONDS);
        self.master.set_target(clamp_level(level, MAX_MASTER_GAIN));
    }

    /// Ramp master gain toward `target` with an explicit time constant.
    pub fn ramp_master(&mut self, target: f32, time_constant: f64) {
        self.master.set_time_constant(time_constant);
        self.master.set_target(clamp_level(target, MAX_MASTER_GAIN));
    }

    /// Apply session parameters without smoothing. Missing band entries
    /// leave the band flat; extra entries are ignored.
    pub fn apply_params(&mut self, params: &PlaybackParams) {
        for (i, band) in self.filters.iter_mut().enumerate() {
            let db = clamp_gain_db(params.band_gains.get(i).copied().unwrap_or(0.0));
            band.gain.set_immediate(db);
            band.filter.set_gain_db(db as f64);
        }
        self.dry.set_immediate(clamp_level(params.reverb_dry, 1.0));
        self.wet.set_immediate(clamp_level(params.reverb_wet, 1.0));
        self.master.set_time_constant(SMOOTHING_SECONDS);
        self.master
            .set_immediate(clamp_level(params.volume, MAX_MASTER_GAIN));
    }

    /// Snapshot the live (target) values as session parameters.
    pub fn params(&self) -> PlaybackParams {
        PlaybackParams {
            volume: self.master_volume(),
            band_gains: self.band_gains(),
            reverb_dry: self.reverb_dry(),
            reverb_wet: self.reverb_wet(),
        }
    }

    // ── Readbacks ───────────────────────────────────────────

    pub fn band_gain(&self, index: usize) -> Option<f32> {
        self.filters.get(index).map(|b| b.gain.target())
    }

    pub fn band_gains(&self) -> Vec<f32> {
        self.filters.iter().map(|b| b.gain.target()).collect()
    }

    pub fn reverb_dry(&self) -> f32 {
        self.dry.target()
    }

    pub fn reverb_wet(&self) -> f32 {
        self.wet.target()
    }

    pub fn echo_delay(&self) -> Option<f64> {
        self.echo.as_ref().map(Echo::delay_time)
    }

    pub fn echo_feedback(&self) -> Option<f32> {
        self.echo.as_ref().map(Echo::feedback)
    }

    pub fn echo_dry(&self) -> Option<f32> {
        self.echo.as_ref().map(Echo::dry)
    }

    pub fn echo_wet(&self) -> Option<f32> {
        self.echo.as_ref().map(Echo::wet)
    }

    pub fn master_volume(&self) -> f32 {
        self.master.target()
    }

    /// Instantaneous master gain, including any ramp in progress.
    pub fn master_level(&self) -> f32 {
        self.master.current()
    }

    // ── Processing ──────────────────────────────────────────

    /// Run one block through the graph in place.
    pub fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        let frames = left.len().min(right.len());
        let (left, right) = (&mut left[..frames], &mut right[..frames]);

        for band in &mut self.filters {
            let db = band.gain.advance(frames);
            band.filter.set_gain_db(db as f64);
            band.filter.process_block(left, right);
        }

        let bypass_reverb = self.wet.is_settled() && self.wet.target() == 0.0;
        if bypass_reverb {
            self.reverb_idle = true;
        } else if self.reverb_idle {
            self.reverb.clear();
            self.reverb_idle = false;
        }

        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let dry = self.dry.next();
            let wet = self.wet.next();
            let (mut out_l, mut out_r) = (*l * dry, *r * dry);
            if !bypass_reverb {
                let (wl, wr) = self.reverb.process(*l, *r);
                out_l += wl * wet;
                out_r += wr * wet;
            }
            if let Some(echo) = &mut self.echo {
                (out_l, out_r) = echo.process(out_l, out_r);
            }
            let master = self.master.next();
            *l = out_l * master;
            *r = out_r * master;
        }

        self.analyser.push_block(left, right);
    }

    /// Byte-scaled magnitude snapshot for display.
    pub fn visualizer_data(&mut self) -> Vec<u8> {
        self.analyser.byte_frequency_data()
    }

    /// Clear every filter state and effect tail.
    pub fn reset(&mut self) {
        for band in &mut self.filters {
            band.filter.reset();
        }
        self.reverb.clear();
        if let Some(echo) = &mut self.echo {
            echo.clear();
        }
        self.analyser.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BandPreset;

    fn graph(echo: bool) -> FilterGraph {
        let config = EngineConfig {
            sample_rate: 8000.0,
            bands: BandPreset::Custom(vec![100.0, 1000.0, 3000.0]),
            echo_enabled: echo,
            ..EngineConfig::default()
        };
        FilterGraph::new(&config).unwrap()
    }

    #[test]
    fn band_gains_clamp_and_ignore_bad_index() {
        let mut g = graph(false);
        g.set_band_gain(0, 40.0);
        g.set_band_gain(1, -40.0);
        g.set_band_gain(2, f32::NAN);
        g.set_band_gain(9, 3.0);
        assert_eq!(g.band_gains(), vec![12.0, -12.0, 0.0]);
        assert_eq!(g.band_gain(9), None);
    }

    #[test]
    fn levels_clamp() {
        let mut g = graph(true);
        g.set_reverb_dry(2.0);
        g.set_reverb_wet(-1.0);
        g.set_master_volume(9.0);
        g.set_echo_delay(8.0);
        g.set_echo_feedback(1.5);
        assert_eq!(g.reverb_dry(), 1.0);
        assert_eq!(g.reverb_wet(), 0.0);
        assert_eq!(g.master_volume(), MAX_MASTER_GAIN);
        assert_eq!(g.echo_delay(), Some(5.0));
        assert_eq!(g.echo_feedback(), Some(0.99));
    }

    #[test]
    fn echo_controls_are_noops_without_echo() {
        let mut g = graph(false);
        g.set_echo_wet(0.5);
        assert_eq!(g.echo_wet(), None);
    }

    #[test]
    fn flat_dry_graph_passes_signal() {
        let mut g = graph(false);
        g.apply_params(&PlaybackParams::flat(3));
        let input: Vec<f32> = (0..256).map(|i| ((i % 17) as f32 / 17.0) - 0.5).collect();
        let mut l = input.clone();
        let mut r = input.clone();
        g.process(&mut l, &mut r);
        for (i, (a, b)) in input.iter().zip(&l).enumerate() {
            assert!((a - b).abs() < 1e-4, "sample {i}: {a} vs {b}");
        }
    }

    #[test]
    fn apply_params_is_instant() {
        let mut g = graph(false);
        let params = PlaybackParams {
            volume: 0.5,
            band_gains: vec![3.0, -3.0, 6.0],
            reverb_dry: 0.7,
            reverb_wet: 0.2,
        };
        g.apply_params(&params);
        assert_eq!(g.master_level(), 0.5);
        assert_eq!(g.params(), params);
    }

    #[test]
    fn master_ramp_approaches_zero() {
        let mut g = graph(false);
        g.apply_params(&PlaybackParams::flat(3));
        g.ramp_master(0.0, 0.025);
        let mut l = vec![0.0; 800];
        let mut r = vec![0.0; 800];
        g.process(&mut l, &mut r);
        // 0.1 s = four time constants
        assert!(g.master_level() < 0.02, "master at {}", g.master_level());
        assert_eq!(g.master_volume(), 0.0);
    }

    #[test]
    fn wet_path_adds_reverb_tail() {
        let mut g = graph(false);
        g.apply_params(&PlaybackParams {
            volume: 1.0,
            band_gains: vec![0.0; 3],
            reverb_dry: 0.0,
            reverb_wet: 1.0,
        });
        let mut l = vec![0.0; 2048];
        let mut r = vec![0.0; 2048];
        l[0] = 1.0;
        r[0] = 1.0;
        g.process(&mut l, &mut r);
        let energy: f32 = l.iter().map(|s| s * s).sum();
        assert!(energy > 1e-4, "expected reverb output, energy {energy}");
    }

    #[test]
    fn visualizer_has_half_fft_bins() {
        let mut g = graph(false);
        assert_eq!(g.visualizer_data().len(), 128);
    }
}
