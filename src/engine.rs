//! Audio engine — the single owner of graph, clock, and playback state.
//!
//! The host constructs one `AudioEngine` and drives it from two places:
//! UI handlers call the control methods, and the audio callback calls
//! [`AudioEngine::render`]. Everything runs on one thread. Listener
//! callbacks are dispatched at the end of each control call and render.

use crate::analysis::{MatchResult, Scheduler, SpectralEstimator, SpectrumProfile, compute_match};
use crate::buffer::{AudioBuffer, decode_with_fallback};
use crate::config::{BandConfig, EngineConfig, RENDER_QUANTUM};
use crate::dsp::context::ProcessingContext;
use crate::dsp::graph::{FilterGraph, PlaybackParams};
use crate::error::{EngineError, Result};
use crate::playback::{EngineEvent, PlaybackController, PlaybackMode, PlaybackState, Source};
use crate::transport::{
    KeepAliveTap, MediaSession, PlaybackListener, TransportBridge, TransportCommand,
};

pub struct AudioEngine {
    config: EngineConfig,
    bands: BandConfig,
    context: ProcessingContext,
    graph: Option<FilterGraph>,
    controller: PlaybackController,
    transport: TransportBridge,
    keep_alive: KeepAliveTap,
    listener: Option<Box<dyn PlaybackListener>>,
}

impl AudioEngine {
    /// Create an engine. The graph is not built and the context stays
    /// suspended until [`initialize`](Self::initialize) or the first `play`.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let bands = config.band_config()?;
        let mut context = ProcessingContext::new(config.sample_rate);
        context.suspend();
        Ok(AudioEngine {
            keep_alive: KeepAliveTap::for_device(config.device),
            config,
            bands,
            context,
            graph: None,
            controller: PlaybackController::new(),
            transport: TransportBridge::new(),
            listener: None,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn bands(&self) -> &BandConfig {
        &self.bands
    }

    /// Build the graph on first call; afterwards only resume a suspended
    /// context. Safe to call from every UI gesture.
    pub fn initialize(&mut self) -> Result<()> {
        if self.graph.is_none() {
            self.graph = Some(FilterGraph::new(&self.config)?);
        }
        if self.context.resume() {
            log::debug!("engine: processing context resumed");
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.graph.is_some()
    }

    /// Suspend the processing context (the host went to the background).
    pub fn suspend(&mut self) {
        self.context.suspend();
    }

    pub fn graph(&self) -> Option<&FilterGraph> {
        self.graph.as_ref()
    }

    pub fn context(&self) -> &ProcessingContext {
        &self.context
    }

    // ── Wiring ──────────────────────────────────────────────

    /// Install (or replace) the outbound listener.
    pub fn set_listener(&mut self, listener: Box<dyn PlaybackListener>) {
        self.listener = Some(listener);
    }

    pub fn clear_listener(&mut self) {
        self.listener = None;
    }

    pub fn attach_media_session(&mut self, session: Box<dyn MediaSession>) {
        self.transport.attach(session);
    }

    pub fn transport(&self) -> &TransportBridge {
        &self.transport
    }

    // ── Playback ────────────────────────────────────────────

    /// Replace whatever is playing with `source` from `offset` seconds.
    pub fn play(&mut self, source: Source, offset: f64, params: &PlaybackParams) -> Result<()> {
        self.initialize()?;
        let now = self.context.current_time();
        let graph = self.graph.as_mut().ok_or(EngineError::GraphNotInitialized)?;
        let result = self.controller.play(graph, now, source, offset, params);
        self.dispatch_events();
        result
    }

    /// Decode `bytes` and play them. Only the bundled fallback asset is
    /// replaced by a synthetic tone when decoding fails.
    pub fn play_encoded(
        &mut self,
        bytes: &[u8],
        asset_id: Option<&str>,
        offset: f64,
        params: &PlaybackParams,
    ) -> Result<()> {
        self.initialize()?;
        self.controller.begin_loading();
        match decode_with_fallback(bytes, asset_id, self.config.sample_rate) {
            Ok(buffer) => self.play(Source::decoded(buffer), offset, params),
            Err(err) => {
                self.controller.fail(&err);
                self.dispatch_events();
                Err(err)
            }
        }
    }

    /// Fade out over `fade` seconds and release the session.
    pub fn stop(&mut self, fade: f64) {
        let now = self.context.current_time();
        if let Some(graph) = self.graph.as_mut() {
            self.controller.stop(graph, now, fade);
            self.dispatch_events();
        }
    }

    pub fn pause(&mut self, fade: f64) {
        let now = self.context.current_time();
        if let Some(graph) = self.graph.as_mut() {
            self.controller.pause(graph, now, fade);
            self.dispatch_events();
        }
    }

    pub fn resume(&mut self) -> Result<()> {
        let now = self.context.current_time();
        let Some(graph) = self.graph.as_mut() else {
            return Ok(());
        };
        let result = self.controller.resume(graph, now);
        self.dispatch_events();
        result
    }

    /// Move to `time` seconds, applying exactly `params`.
    pub fn seek(&mut self, time: f64, params: &PlaybackParams) -> Result<()> {
        let now = self.context.current_time();
        let Some(graph) = self.graph.as_mut() else {
            return Ok(());
        };
        let result = self.controller.seek(graph, now, time, params);
        self.dispatch_events();
        result
    }

    /// Move to `time` seconds keeping the live FX values.
    pub fn seek_preserving(&mut self, time: f64) -> Result<()> {
        let now = self.context.current_time();
        let Some(graph) = self.graph.as_mut() else {
            return Ok(());
        };
        let result = self.controller.seek_preserving(graph, now, time);
        self.dispatch_events();
        result
    }

    pub fn current_time(&self) -> f64 {
        self.controller.current_time(self.context.current_time())
    }

    pub fn duration(&self) -> f64 {
        self.controller.duration()
    }

    pub fn is_playing(&self) -> bool {
        self.controller.is_playing()
    }

    pub fn state(&self) -> &PlaybackState {
        self.controller.state()
    }

    pub fn mode(&self) -> PlaybackMode {
        self.controller.mode()
    }

    // ── Live parameters (no-ops before initialize) ──────────

    pub fn set_band_gain(&mut self, index: usize, db: f32) {
        if let Some(g) = self.graph.as_mut() {
            g.set_band_gain(index, db);
        }
    }

    pub fn set_reverb_dry(&mut self, level: f32) {
        if let Some(g) = self.graph.as_mut() {
            g.set_reverb_dry(level);
        }
    }

    pub fn set_reverb_wet(&mut self, level: f32) {
        if let Some(g) = self.graph.as_mut() {
            g.set_reverb_wet(level);
        }
    }

    pub fn set_echo_delay(&mut self, seconds: f64) {
        if let Some(g) = self.graph.as_mut() {
            g.set_echo_delay(seconds);
        }
    }

    pub fn set_echo_feedback(&mut self, gain: f32) {
        if let Some(g) = self.graph.as_mut() {
            g.set_echo_feedback(gain);
        }
    }

    pub fn set_echo_dry(&mut self, level: f32) {
        if let Some(g) = self.graph.as_mut() {
            g.set_echo_dry(level);
        }
    }

    pub fn set_echo_wet(&mut self, level: f32) {
        if let Some(g) = self.graph.as_mut() {
            g.set_echo_wet(level);
        }
    }

    pub fn set_volume(&mut self, level: f32) {
        if let Some(g) = self.graph.as_mut() {
            g.set_master_volume(level);
        }
    }

    /// Write match gains to the bands.
    pub fn apply_match(&mut self, gains: &[f32]) {
        if let Some(g) = self.graph.as_mut() {
            for (i, &db) in gains.iter().enumerate() {
                g.set_band_gain(i, db);
            }
        }
    }

    // ── Analysis ────────────────────────────────────────────

    /// An estimator for this engine's bands and device class. Owned, so
    /// the estimation can outlive a borrow of the engine.
    pub fn estimator(&self) -> SpectralEstimator {
        SpectralEstimator::new(self.bands.clone(), self.config.device.analysis())
    }

    pub async fn estimate_spectrum<S: Scheduler>(
        &self,
        buffer: &AudioBuffer,
        scheduler: &S,
    ) -> SpectrumProfile {
        self.estimator().estimate(buffer, scheduler).await
    }

    pub fn compute_match(&self, source: &[f32], target: &[f32]) -> MatchResult {
        compute_match(source, target)
    }

    /// Current analyser snapshot; silence before initialisation.
    pub fn visualizer_data(&mut self) -> Vec<u8> {
        match self.graph.as_mut() {
            Some(g) => g.visualizer_data(),
            None => vec![0; self.config.analyser_fft_size / 2],
        }
    }

    // ── Transport ───────────────────────────────────────────

    /// Relay a control-surface command to the listener.
    pub fn handle_transport(&mut self, command: TransportCommand) {
        log::debug!("transport: {command:?}");
        if let Some(listener) = self.listener.as_mut() {
            listener.on_transport_request(command);
        }
    }

    pub fn notify_metadata_changed(&mut self, title: &str) {
        self.transport.notify_metadata_changed(title);
    }

    pub fn notify_position_changed(&mut self) {
        let (position, duration) = (self.current_time(), self.duration());
        self.transport.notify_position_changed(position, duration);
    }

    // ── Rendering ───────────────────────────────────────────

    /// The audio callback. Pulls the session through the graph in
    /// render quanta, advancing the clock and firing due timers.
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        let frames = left.len().min(right.len());
        let Some(graph) = self.graph.as_mut() else {
            left.fill(0.0);
            right.fill(0.0);
            return;
        };
        if self.context.is_suspended() {
            left.fill(0.0);
            right.fill(0.0);
            return;
        }

        let rate = self.context.sample_rate();
        let mut start = 0;
        while start < frames {
            let end = (start + RENDER_QUANTUM).min(frames);
            let (l, r) = (&mut left[start..end], &mut right[start..end]);
            self.controller.render(l, r, rate);
            graph.process(l, r);
            self.context.advance(end - start);
            self.controller.poll_timers(self.context.current_time());
            start = end;
        }
        self.dispatch_events();
    }

    /// Fill the keep-alive loopback from a rendered block.
    pub fn render_keep_alive(
        &self,
        left: &[f32],
        right: &[f32],
        out_left: &mut [f32],
        out_right: &mut [f32],
    ) {
        self.keep_alive.render(left, right, out_left, out_right);
    }

    pub fn keep_alive(&self) -> &KeepAliveTap {
        &self.keep_alive
    }

    fn dispatch_events(&mut self) {
        let has_source = self.controller.has_session();
        for event in self.controller.drain_events() {
            if let EngineEvent::PlaybackChanged(playing) = event {
                self.transport.notify_playback_state(playing, has_source);
            }
            let Some(listener) = self.listener.as_mut() else {
                continue;
            };
            match event {
                EngineEvent::PlaybackChanged(playing) => listener.on_playback_change(playing),
                EngineEvent::TrackEnded => listener.on_track_ended(),
                EngineEvent::Error(reason) => listener.on_error(&reason),
            }
        }
    }
}

impl std::fmt::Debug for AudioEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioEngine")
            .field("bands", &self.bands.len())
            .field("initialized", &self.graph.is_some())
            .field("state", self.controller.state())
            .field("time", &self.context.current_time())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BandPreset;

    fn engine() -> AudioEngine {
        AudioEngine::new(EngineConfig {
            sample_rate: 8000.0,
            bands: BandPreset::Custom(vec![100.0, 1000.0, 3000.0]),
            ..EngineConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn mutators_are_noops_before_initialize() {
        let mut e = engine();
        e.set_band_gain(0, 6.0);
        e.set_volume(0.3);
        e.stop(0.1);
        assert!(!e.is_initialized());
        assert_eq!(e.visualizer_data(), vec![0; 128]);
    }

    #[test]
    fn initialize_is_idempotent() {
        let mut e = engine();
        e.initialize().unwrap();
        e.set_band_gain(1, 4.0);
        e.initialize().unwrap();
        e.initialize().unwrap();
        assert_eq!(e.graph().unwrap().band_gain(1), Some(4.0));
        assert!(!e.context().is_suspended());
    }

    #[test]
    fn suspended_context_renders_silence_and_freezes_clock() {
        let mut e = engine();
        let buf = AudioBuffer::sine(440.0, 1.0, 8000.0);
        e.play(Source::decoded(buf), 0.0, &PlaybackParams::flat(3)).unwrap();
        e.suspend();
        let (mut l, mut r) = (vec![1.0; 256], vec![1.0; 256]);
        e.render(&mut l, &mut r);
        assert!(l.iter().all(|s| *s == 0.0));
        assert_eq!(e.current_time(), 0.0);
        e.initialize().unwrap();
        e.render(&mut l, &mut r);
        assert!((e.current_time() - 256.0 / 8000.0).abs() < 1e-9);
    }

    #[test]
    fn bad_config_is_rejected() {
        let config = EngineConfig {
            sample_rate: 8000.0,
            bands: BandPreset::TenBand,
            ..EngineConfig::default()
        };
        assert!(matches!(AudioEngine::new(config), Err(EngineError::InvalidConfig(_))));
    }
}
