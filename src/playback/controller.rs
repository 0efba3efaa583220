//! Playback controller — the session state machine.
//!
//! ```text
//! Idle → Loading → PlayingBuffer | PlayingStream → Stopping → Idle
//!                          │                           │
//!                          └──────── Error ◄───────────┘ (stream failure)
//! ```
//!
//! At most one [`PlaybackSession`] exists. `play` replaces it without a
//! fade; `stop` fades the master gain and schedules the teardown as a
//! deadline on the processing-context clock. Outbound notifications are
//! queued as [`EngineEvent`]s and drained by the engine.

use super::session::{PlaybackMode, PlaybackSession, Pull};
use super::source::Source;
use crate::config::{MAX_MASTER_GAIN, clamp_level};
use crate::dsp::graph::{FilterGraph, PlaybackParams};
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Loading,
    PlayingBuffer,
    PlayingStream,
    /// Master is fading out; teardown (or pause) is pending.
    Stopping,
    Paused,
    Error {
        reason: String,
    },
}

/// Notification for the outside world, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    PlaybackChanged(bool),
    TrackEnded,
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    Stop,
    Pause,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    kind: PendingKind,
    /// Context time at which the action fires.
    deadline: f64,
    /// Master volume to restore if the fade is cancelled by `resume`.
    volume: f32,
}

#[derive(Debug, Default)]
pub struct PlaybackController {
    state: PlaybackState,
    session: Option<PlaybackSession>,
    pending: Option<Pending>,
    /// Master volume to restore on `resume` after a completed pause.
    paused_volume: f32,
    /// Last value sent as `PlaybackChanged`.
    announced: bool,
    events: Vec<EngineEvent>,
}

impl PlaybackController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn mode(&self) -> PlaybackMode {
        self.session
            .as_ref()
            .map_or(PlaybackMode::None, PlaybackSession::mode)
    }

    pub fn is_playing(&self) -> bool {
        matches!(
            self.state,
            PlaybackState::PlayingBuffer | PlaybackState::PlayingStream
        )
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn has_pending_teardown(&self) -> bool {
        self.pending.is_some()
    }

    pub fn current_time(&self, now: f64) -> f64 {
        self.session.as_ref().map_or(0.0, |s| s.current_time(now))
    }

    pub fn duration(&self) -> f64 {
        self.session.as_ref().map_or(0.0, PlaybackSession::duration)
    }

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    /// Queue an event for the next dispatch.
    pub fn emit(&mut self, event: EngineEvent) {
        self.events.push(event);
    }

    fn announce(&mut self, playing: bool) {
        self.announced = playing;
        self.emit(EngineEvent::PlaybackChanged(playing));
    }

    /// Mark the start of an asynchronous source preparation (decode).
    pub fn begin_loading(&mut self) {
        log::debug!("playback: {:?} → Loading", self.state);
        self.state = PlaybackState::Loading;
    }

    /// Abandon the current session and enter `Error`.
    pub fn fail(&mut self, err: &EngineError) {
        self.pending = None;
        self.session = None;
        let reason = err.to_string();
        log::warn!("playback failed: {reason}");
        self.state = PlaybackState::Error {
            reason: reason.clone(),
        };
        if self.announced {
            self.announce(false);
        }
        self.emit(EngineEvent::Error(reason));
    }

    /// Start `source` at `offset` seconds, replacing any session at once.
    pub fn play(
        &mut self,
        graph: &mut FilterGraph,
        now: f64,
        source: Source,
        offset: f64,
        params: &PlaybackParams,
    ) -> Result<()> {
        self.start(graph, now, source, offset, params, true)
    }

    fn start(
        &mut self,
        graph: &mut FilterGraph,
        now: f64,
        source: Source,
        offset: f64,
        params: &PlaybackParams,
        notify: bool,
    ) -> Result<()> {
        self.pending = None;
        if let Some(old) = self.session.take() {
            log::debug!("playback: force-terminating {:?}", old.mode());
            drop(old);
            graph.reset();
        }
        graph.apply_params(params);

        match PlaybackSession::start(source, offset, now) {
            Ok(session) => {
                self.state = match session.mode() {
                    PlaybackMode::Stream => PlaybackState::PlayingStream,
                    _ => PlaybackState::PlayingBuffer,
                };
                log::info!("playback: {:?} from {offset:.3}s", self.state);
                self.session = Some(session);
                if notify || !self.announced {
                    self.announce(true);
                }
                Ok(())
            }
            Err(err) => {
                self.fail(&err);
                Err(err)
            }
        }
    }

    /// Fade out over `fade` seconds, then tear the session down.
    /// A second call restarts the fade; `fade <= 0` tears down at once.
    pub fn stop(&mut self, graph: &mut FilterGraph, now: f64, fade: f64) {
        if self.session.is_none() {
            self.pending = None;
            if matches!(self.state, PlaybackState::Stopping | PlaybackState::Paused) {
                self.state = PlaybackState::Idle;
            }
            return;
        }
        let volume = self.restore_volume(graph);

        // A paused session is already silent.
        if fade > 0.0 && self.state != PlaybackState::Paused {
            graph.ramp_master(0.0, fade / 4.0);
            self.pending = Some(Pending {
                kind: PendingKind::Stop,
                deadline: now + fade,
                volume,
            });
            self.state = PlaybackState::Stopping;
            log::debug!("playback: stopping, teardown at {:.3}s", now + fade);
        } else {
            self.teardown();
        }
        if self.announced {
            self.announce(false);
        }
    }

    /// Fade out, then pause in place keeping the source and position.
    pub fn pause(&mut self, graph: &mut FilterGraph, now: f64, fade: f64) {
        if !self.is_playing() {
            return;
        }
        let volume = graph.master_volume();
        if fade > 0.0 {
            graph.ramp_master(0.0, fade / 4.0);
            self.pending = Some(Pending {
                kind: PendingKind::Pause,
                deadline: now + fade,
                volume,
            });
            self.state = PlaybackState::Stopping;
        } else {
            self.paused_volume = volume;
            self.finish_pause(now);
        }
        self.announce(false);
    }

    /// Resume a paused session (or cancel a pause still fading out).
    pub fn resume(&mut self, graph: &mut FilterGraph, now: f64) -> Result<()> {
        let volume = match (self.pending, &self.state) {
            (Some(p), _) if p.kind == PendingKind::Pause => p.volume,
            (None, PlaybackState::Paused) => self.paused_volume,
            _ => return Ok(()),
        };
        self.pending = None;
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        if let Err(err) = session.resume(now) {
            self.fail(&err);
            return Err(err);
        }
        graph.set_master_volume(volume);
        self.state = match session.mode() {
            PlaybackMode::Stream => PlaybackState::PlayingStream,
            _ => PlaybackState::PlayingBuffer,
        };
        self.announce(true);
        Ok(())
    }

    /// Move to `time` seconds and apply `params`.
    ///
    /// Streams reposition in place. A running buffer cannot be moved, so it
    /// is restarted from `time` with exactly `params`.
    pub fn seek(
        &mut self,
        graph: &mut FilterGraph,
        now: f64,
        time: f64,
        params: &PlaybackParams,
    ) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        match self.state {
            PlaybackState::PlayingBuffer => {
                let Some(buffer) = session.buffer().cloned() else {
                    return Ok(());
                };
                log::debug!("playback: buffer seek to {time:.3}s (restart)");
                self.start(graph, now, Source::Decoded(buffer), time, params, false)
            }
            PlaybackState::PlayingStream => {
                session.reposition(time);
                graph.apply_params(params);
                Ok(())
            }
            PlaybackState::Paused => {
                // Master stays silent; the volume takes effect on resume.
                session.reposition(time);
                self.paused_volume = clamp_level(params.volume, MAX_MASTER_GAIN);
                graph.apply_params(&PlaybackParams {
                    volume: 0.0,
                    ..params.clone()
                });
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Seek while keeping whatever FX values are currently live.
    pub fn seek_preserving(&mut self, graph: &mut FilterGraph, now: f64, time: f64) -> Result<()> {
        let mut params = graph.params();
        if self.state == PlaybackState::Paused {
            params.volume = self.paused_volume;
        }
        self.seek(graph, now, time, &params)
    }

    /// Fire a pending teardown whose deadline has passed.
    pub fn poll_timers(&mut self, now: f64) {
        let Some(pending) = self.pending else {
            return;
        };
        if now + 1e-9 < pending.deadline {
            return;
        }
        self.pending = None;
        match pending.kind {
            PendingKind::Stop => self.teardown(),
            PendingKind::Pause => {
                self.paused_volume = pending.volume;
                self.finish_pause(now);
            }
        }
    }

    /// Pull the next block from the session into `left`/`right`.
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32], context_rate: f64) {
        let Some(session) = self.session.as_mut() else {
            left.fill(0.0);
            right.fill(0.0);
            return;
        };
        match session.pull(left, right, context_rate) {
            Ok(Pull::Playing) => {}
            Ok(Pull::Ended) => {
                self.teardown();
                if self.announced {
                    log::info!("playback: track ended");
                    self.announce(false);
                    self.emit(EngineEvent::TrackEnded);
                }
            }
            Err(err) => {
                left.fill(0.0);
                right.fill(0.0);
                self.fail(&err);
            }
        }
    }

    fn finish_pause(&mut self, now: f64) {
        if let Some(session) = self.session.as_mut() {
            session.pause(now);
            self.state = PlaybackState::Paused;
            log::debug!("playback: paused at {:.3}s", session.current_time(now));
        }
    }

    fn teardown(&mut self) {
        self.pending = None;
        if let Some(session) = self.session.take() {
            log::debug!("playback: released {:?} session", session.mode());
        }
        self.state = PlaybackState::Idle;
    }

    fn restore_volume(&self, graph: &FilterGraph) -> f32 {
        match self.pending {
            Some(p) => p.volume,
            None if self.state == PlaybackState::Paused => self.paused_volume,
            None => graph.master_volume(),
        }
    }
}
