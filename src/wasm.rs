//! WASM bindings — the engine as seen from JavaScript.
//!
//! The page owns the `AudioContext`; an AudioWorklet calls `render` with
//! its output buffers, media elements arrive as [`JsStream`] objects, and
//! the Media Session API is wrapped by the page as a [`JsMediaSession`].

use std::future::Future;

use js_sys::{Array, Function, Promise};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{JsFuture, future_to_promise};

use crate::analysis::{Scheduler, match_sources};
use crate::buffer::AudioBuffer;
use crate::config::{DEFAULT_FADE_SECONDS, EngineConfig};
use crate::dsp::graph::PlaybackParams;
use crate::engine::AudioEngine;
use crate::error::{EngineError, Result};
use crate::playback::{PlaybackState, Source, StreamHandle};
use crate::transport::{
    MediaAction, MediaPlaybackState, MediaSession, PlaybackListener, TransportCommand,
};

/// Module start hook: panic messages and `log` output go to the console.
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Debug).ok();
    log::info!("tonematch-core {} loaded", crate::VERSION);
}

#[wasm_bindgen]
extern "C" {
    /// A streaming media element wrapper provided by the page.
    pub type JsStream;

    #[wasm_bindgen(method, catch)]
    fn read(
        this: &JsStream,
        left: &mut [f32],
        right: &mut [f32],
    ) -> std::result::Result<u32, JsValue>;

    #[wasm_bindgen(method, getter, js_name = currentTime)]
    fn current_time(this: &JsStream) -> f64;

    #[wasm_bindgen(method, setter, js_name = currentTime)]
    fn set_current_time(this: &JsStream, seconds: f64);

    #[wasm_bindgen(method, getter)]
    fn duration(this: &JsStream) -> f64;

    #[wasm_bindgen(method, getter)]
    fn ended(this: &JsStream) -> bool;

    #[wasm_bindgen(method, catch)]
    fn play(this: &JsStream) -> std::result::Result<(), JsValue>;

    #[wasm_bindgen(method)]
    fn pause(this: &JsStream);

    #[wasm_bindgen(method)]
    fn release(this: &JsStream);

    /// The page's wrapper around `navigator.mediaSession`.
    pub type JsMediaSession;

    #[wasm_bindgen(method, js_name = setMetadata)]
    fn set_metadata(this: &JsMediaSession, title: &str);

    #[wasm_bindgen(method, js_name = setPlaybackState)]
    fn set_playback_state(this: &JsMediaSession, state: &str);

    #[wasm_bindgen(method, js_name = setPositionState)]
    fn set_position_state(this: &JsMediaSession, position: f64, duration: f64);

    #[wasm_bindgen(method, js_name = registerActions)]
    fn register_actions(this: &JsMediaSession, actions: Array);
}

fn js_error(err: EngineError) -> JsValue {
    JsValue::from_str(&format!("{err}"))
}

fn js_reason(value: &JsValue) -> String {
    value.as_string().unwrap_or_else(|| format!("{value:?}"))
}

struct JsStreamHandle(JsStream);

impl StreamHandle for JsStreamHandle {
    fn read(&mut self, left: &mut [f32], right: &mut [f32]) -> Result<usize> {
        self.0
            .read(left, right)
            .map(|n| n as usize)
            .map_err(|e| EngineError::Stream(js_reason(&e)))
    }

    fn position(&self) -> f64 {
        self.0.current_time()
    }

    fn duration(&self) -> f64 {
        let d = self.0.duration();
        if d.is_finite() { d } else { 0.0 }
    }

    fn set_position(&mut self, seconds: f64) {
        self.0.set_current_time(seconds);
    }

    fn play(&mut self) -> Result<()> {
        self.0
            .play()
            .map_err(|e| EngineError::Stream(js_reason(&e)))
    }

    fn pause(&mut self) {
        self.0.pause();
    }

    fn is_ended(&self) -> bool {
        self.0.ended()
    }

    fn release(&mut self) {
        self.0.release();
    }
}

struct JsMediaSessionHandle(JsMediaSession);

impl MediaSession for JsMediaSessionHandle {
    fn set_metadata(&mut self, title: &str) {
        self.0.set_metadata(title);
    }

    fn set_playback_state(&mut self, state: MediaPlaybackState) {
        self.0.set_playback_state(state.as_str());
    }

    fn set_position_state(&mut self, position: f64, duration: f64) {
        self.0.set_position_state(position, duration);
    }

    fn register_actions(&mut self, actions: &[MediaAction]) {
        let names: Array = actions
            .iter()
            .map(|a| JsValue::from_str(a.as_str()))
            .collect();
        self.0.register_actions(names);
    }
}

/// Listener forwarding to optional JS callbacks.
#[derive(Default)]
struct JsListener {
    on_playback_change: Option<Function>,
    on_seek_requested: Option<Function>,
    on_track_ended: Option<Function>,
    on_transport_request: Option<Function>,
    on_error: Option<Function>,
}

fn invoke(callback: &Option<Function>, args: &[JsValue]) {
    let Some(f) = callback else {
        return;
    };
    let result = match args {
        [] => f.call0(&JsValue::NULL),
        [a] => f.call1(&JsValue::NULL, a),
        [a, b, ..] => f.call2(&JsValue::NULL, a, b),
    };
    if let Err(e) = result {
        log::warn!("listener callback threw: {}", js_reason(&e));
    }
}

impl PlaybackListener for JsListener {
    fn on_playback_change(&mut self, playing: bool) {
        invoke(&self.on_playback_change, &[JsValue::from_bool(playing)]);
    }

    fn on_seek_requested(&mut self, time: f64) {
        invoke(&self.on_seek_requested, &[JsValue::from_f64(time)]);
    }

    fn on_track_ended(&mut self) {
        invoke(&self.on_track_ended, &[]);
    }

    fn on_error(&mut self, reason: &str) {
        invoke(&self.on_error, &[JsValue::from_str(reason)]);
    }

    fn on_transport_request(&mut self, command: TransportCommand) {
        if let TransportCommand::SeekTo(time) = command {
            self.on_seek_requested(time);
        }
        if self.on_transport_request.is_some() {
            match serde_wasm_bindgen::to_value(&command) {
                Ok(value) => invoke(&self.on_transport_request, &[value]),
                Err(e) => log::warn!("transport command not serializable: {e}"),
            }
        }
    }
}

/// Yields and cooldowns as `setTimeout` macrotasks, so the page can paint
/// and handle input between analysis segments.
#[derive(Debug, Clone, Copy, Default)]
struct TimeoutScheduler;

fn timeout(ms: i32) -> impl Future<Output = ()> {
    let promise = Promise::new(&mut |resolve, _reject| {
        let scheduled = web_sys::window().and_then(|w| {
            w.set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, ms)
                .ok()
        });
        if scheduled.is_none() {
            let _ = resolve.call0(&JsValue::NULL);
        }
    });
    async move {
        let _ = JsFuture::from(promise).await;
    }
}

impl Scheduler for TimeoutScheduler {
    fn yield_now(&self) -> impl Future<Output = ()> {
        timeout(0)
    }

    fn sleep(&self, duration: std::time::Duration) -> impl Future<Output = ()> {
        timeout(duration.as_millis().min(i32::MAX as u128) as i32)
    }
}

fn buffer_from(left: Vec<f32>, right: Option<Vec<f32>>, sample_rate: f64) -> Result<AudioBuffer> {
    let mut channels = vec![left];
    channels.extend(right);
    AudioBuffer::new(channels, sample_rate)
}

fn params(volume: f32, band_gains: Vec<f32>, reverb_dry: f32, reverb_wet: f32) -> PlaybackParams {
    PlaybackParams {
        volume,
        band_gains,
        reverb_dry,
        reverb_wet,
    }
}

/// JavaScript handle to one [`AudioEngine`].
#[wasm_bindgen]
pub struct WasmAudioEngine {
    inner: AudioEngine,
}

#[wasm_bindgen]
impl WasmAudioEngine {
    /// Create an engine from a camelCase config object (or `undefined`).
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> std::result::Result<WasmAudioEngine, JsValue> {
        let config: EngineConfig = if config.is_undefined() || config.is_null() {
            EngineConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config)
                .map_err(|e| JsValue::from_str(&format!("invalid config: {e}")))?
        };
        let inner = AudioEngine::new(config).map_err(js_error)?;
        Ok(WasmAudioEngine { inner })
    }

    pub fn initialize(&mut self) -> std::result::Result<(), JsValue> {
        self.inner.initialize().map_err(js_error)
    }

    pub fn suspend(&mut self) {
        self.inner.suspend();
    }

    #[wasm_bindgen(js_name = bandFrequencies)]
    pub fn band_frequencies(&self) -> Vec<f32> {
        self.inner.bands().frequencies().to_vec()
    }

    /// Register (or replace) every outbound callback at once.
    #[wasm_bindgen(js_name = setListener)]
    pub fn set_listener(
        &mut self,
        on_playback_change: Option<Function>,
        on_seek_requested: Option<Function>,
        on_track_ended: Option<Function>,
        on_transport_request: Option<Function>,
        on_error: Option<Function>,
    ) {
        self.inner.set_listener(Box::new(JsListener {
            on_playback_change,
            on_seek_requested,
            on_track_ended,
            on_transport_request,
            on_error,
        }));
    }

    #[wasm_bindgen(js_name = attachMediaSession)]
    pub fn attach_media_session(&mut self, session: JsMediaSession) {
        self.inner
            .attach_media_session(Box::new(JsMediaSessionHandle(session)));
    }

    // ===== Playback =====

    /// Play planar channels already decoded by the page.
    #[allow(clippy::too_many_arguments)]
    pub fn play(
        &mut self,
        left: Vec<f32>,
        right: Option<Vec<f32>>,
        sample_rate: f64,
        offset: f64,
        volume: f32,
        band_gains: Vec<f32>,
        reverb_dry: f32,
        reverb_wet: f32,
    ) -> std::result::Result<(), JsValue> {
        let buffer = buffer_from(left, right, sample_rate).map_err(js_error)?;
        let params = params(volume, band_gains, reverb_dry, reverb_wet);
        self.inner
            .play(Source::decoded(buffer), offset, &params)
            .map_err(js_error)
    }

    #[wasm_bindgen(js_name = playStream)]
    pub fn play_stream(
        &mut self,
        stream: JsStream,
        offset: f64,
        volume: f32,
        band_gains: Vec<f32>,
        reverb_dry: f32,
        reverb_wet: f32,
    ) -> std::result::Result<(), JsValue> {
        let params = params(volume, band_gains, reverb_dry, reverb_wet);
        self.inner
            .play(Source::streamed(JsStreamHandle(stream)), offset, &params)
            .map_err(js_error)
    }

    /// Decode WAV bytes in-crate and play them.
    #[wasm_bindgen(js_name = playEncoded)]
    #[allow(clippy::too_many_arguments)]
    pub fn play_encoded(
        &mut self,
        bytes: &[u8],
        asset_id: Option<String>,
        offset: f64,
        volume: f32,
        band_gains: Vec<f32>,
        reverb_dry: f32,
        reverb_wet: f32,
    ) -> std::result::Result<(), JsValue> {
        let params = params(volume, band_gains, reverb_dry, reverb_wet);
        self.inner
            .play_encoded(bytes, asset_id.as_deref(), offset, &params)
            .map_err(js_error)
    }

    pub fn stop(&mut self, fade_seconds: Option<f64>) {
        self.inner.stop(fade_seconds.unwrap_or(DEFAULT_FADE_SECONDS));
    }

    pub fn pause(&mut self, fade_seconds: Option<f64>) {
        self.inner.pause(fade_seconds.unwrap_or(DEFAULT_FADE_SECONDS));
    }

    pub fn resume(&mut self) -> std::result::Result<(), JsValue> {
        self.inner.resume().map_err(js_error)
    }

    pub fn seek(
        &mut self,
        time: f64,
        volume: f32,
        band_gains: Vec<f32>,
        reverb_dry: f32,
        reverb_wet: f32,
    ) -> std::result::Result<(), JsValue> {
        let params = params(volume, band_gains, reverb_dry, reverb_wet);
        self.inner.seek(time, &params).map_err(js_error)
    }

    #[wasm_bindgen(js_name = seekPreserving)]
    pub fn seek_preserving(&mut self, time: f64) -> std::result::Result<(), JsValue> {
        self.inner.seek_preserving(time).map_err(js_error)
    }

    // ===== Live parameters =====

    #[wasm_bindgen(js_name = setBandGain)]
    pub fn set_band_gain(&mut self, index: usize, db: f32) {
        self.inner.set_band_gain(index, db);
    }

    #[wasm_bindgen(js_name = setReverbDry)]
    pub fn set_reverb_dry(&mut self, level: f32) {
        self.inner.set_reverb_dry(level);
    }

    #[wasm_bindgen(js_name = setReverbWet)]
    pub fn set_reverb_wet(&mut self, level: f32) {
        self.inner.set_reverb_wet(level);
    }

    #[wasm_bindgen(js_name = setEchoDelay)]
    pub fn set_echo_delay(&mut self, seconds: f64) {
        self.inner.set_echo_delay(seconds);
    }

    #[wasm_bindgen(js_name = setEchoFeedback)]
    pub fn set_echo_feedback(&mut self, gain: f32) {
        self.inner.set_echo_feedback(gain);
    }

    #[wasm_bindgen(js_name = setEchoDry)]
    pub fn set_echo_dry(&mut self, level: f32) {
        self.inner.set_echo_dry(level);
    }

    #[wasm_bindgen(js_name = setEchoWet)]
    pub fn set_echo_wet(&mut self, level: f32) {
        self.inner.set_echo_wet(level);
    }

    #[wasm_bindgen(js_name = setVolume)]
    pub fn set_volume(&mut self, level: f32) {
        self.inner.set_volume(level);
    }

    #[wasm_bindgen(js_name = applyMatch)]
    pub fn apply_match(&mut self, gains: Vec<f32>) {
        self.inner.apply_match(&gains);
    }

    /// Live band gains (targets), empty before initialisation.
    #[wasm_bindgen(js_name = getBandGains)]
    pub fn get_band_gains(&self) -> Vec<f32> {
        self.inner
            .graph()
            .map(|g| g.band_gains())
            .unwrap_or_default()
    }

    // ===== State queries =====

    #[wasm_bindgen(js_name = getCurrentTime)]
    pub fn get_current_time(&self) -> f64 {
        self.inner.current_time()
    }

    #[wasm_bindgen(js_name = getDuration)]
    pub fn get_duration(&self) -> f64 {
        self.inner.duration()
    }

    #[wasm_bindgen(js_name = getIsPlaying)]
    pub fn get_is_playing(&self) -> bool {
        self.inner.is_playing()
    }

    #[wasm_bindgen(js_name = getState)]
    pub fn get_state(&self) -> String {
        match self.inner.state() {
            PlaybackState::Idle => "idle".to_string(),
            PlaybackState::Loading => "loading".to_string(),
            PlaybackState::PlayingBuffer => "playingBuffer".to_string(),
            PlaybackState::PlayingStream => "playingStream".to_string(),
            PlaybackState::Stopping => "stopping".to_string(),
            PlaybackState::Paused => "paused".to_string(),
            PlaybackState::Error { reason } => format!("error: {reason}"),
        }
    }

    #[wasm_bindgen(js_name = getVisualizerData)]
    pub fn get_visualizer_data(&mut self) -> Vec<u8> {
        self.inner.visualizer_data()
    }

    // ===== Analysis =====

    /// Resolves to the per-band dB profile of the given channels.
    #[wasm_bindgen(js_name = estimateSpectrum)]
    pub fn estimate_spectrum(
        &self,
        left: Vec<f32>,
        right: Option<Vec<f32>>,
        sample_rate: f64,
    ) -> Promise {
        let estimator = self.inner.estimator();
        future_to_promise(async move {
            let buffer = buffer_from(left, right, sample_rate).map_err(js_error)?;
            let profile = estimator.estimate(&buffer, &TimeoutScheduler).await;
            serde_wasm_bindgen::to_value(&profile).map_err(|e| JsValue::from_str(&format!("{e}")))
        })
    }

    /// Estimate both mono sources back to back and resolve to
    /// `{ source, target, gains }`.
    #[wasm_bindgen(js_name = matchSources)]
    pub fn match_sources(
        &self,
        source: Vec<f32>,
        source_rate: f64,
        target: Vec<f32>,
        target_rate: f64,
    ) -> Promise {
        let estimator = self.inner.estimator();
        let device = self.inner.config().device;
        future_to_promise(async move {
            let source = AudioBuffer::mono(source, source_rate).map_err(js_error)?;
            let target = AudioBuffer::mono(target, target_rate).map_err(js_error)?;
            let outcome =
                match_sources(&estimator, device, &source, &target, &TimeoutScheduler).await;
            serde_wasm_bindgen::to_value(&outcome).map_err(|e| JsValue::from_str(&format!("{e}")))
        })
    }

    #[wasm_bindgen(js_name = computeMatch)]
    pub fn compute_match(&self, source: Vec<f32>, target: Vec<f32>) -> Vec<f32> {
        self.inner.compute_match(&source, &target)
    }

    // ===== Rendering & transport =====

    /// Render one block into the worklet's output channels.
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        self.inner.render(left, right);
    }

    #[wasm_bindgen(js_name = renderKeepAlive)]
    pub fn render_keep_alive(
        &self,
        left: &[f32],
        right: &[f32],
        out_left: &mut [f32],
        out_right: &mut [f32],
    ) {
        self.inner.render_keep_alive(left, right, out_left, out_right);
    }

    /// Relay a Media Session action (`play`, `pause`, `seekto`,
    /// `nexttrack`, `previoustrack`).
    #[wasm_bindgen(js_name = handleTransport)]
    pub fn handle_transport(
        &mut self,
        action: &str,
        time: Option<f64>,
    ) -> std::result::Result<(), JsValue> {
        let command = match action {
            "play" => TransportCommand::Play,
            "pause" => TransportCommand::Pause,
            "seekto" => TransportCommand::SeekTo(time.unwrap_or(0.0)),
            "nexttrack" => TransportCommand::SkipForward,
            "previoustrack" => TransportCommand::SkipBackward,
            other => {
                return Err(JsValue::from_str(&format!(
                    "unknown transport action '{other}'"
                )));
            }
        };
        self.inner.handle_transport(command);
        Ok(())
    }

    #[wasm_bindgen(js_name = notifyMetadataChanged)]
    pub fn notify_metadata_changed(&mut self, title: &str) {
        self.inner.notify_metadata_changed(title);
    }

    #[wasm_bindgen(js_name = notifyPositionChanged)]
    pub fn notify_position_changed(&mut self) {
        self.inner.notify_position_changed();
    }
}
