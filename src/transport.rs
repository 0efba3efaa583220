//! Transport bridge — OS media controls in, playback notifications out.
//!
//! The host wires a [`MediaSession`] (the OS control surface) and a
//! [`PlaybackListener`] (the application). The bridge pushes metadata and
//! position outward and relays control-surface commands inward.
//!
//! [`KeepAliveTap`] is the loopback copy of the graph output that stops the
//! OS from suspending a backgrounded page on constrained devices.

use serde::{Deserialize, Serialize};

use crate::config::DeviceClass;

/// A command originating from the OS control surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "time", rename_all = "camelCase")]
pub enum TransportCommand {
    Play,
    Pause,
    SeekTo(f64),
    SkipForward,
    SkipBackward,
}

/// Action handlers registered with the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaAction {
    Play,
    Pause,
    SeekTo,
    NextTrack,
    PreviousTrack,
}

impl MediaAction {
    pub const ALL: [MediaAction; 5] = [
        MediaAction::Play,
        MediaAction::Pause,
        MediaAction::SeekTo,
        MediaAction::NextTrack,
        MediaAction::PreviousTrack,
    ];

    /// The W3C Media Session action name.
    pub fn as_str(self) -> &'static str {
        match self {
            MediaAction::Play => "play",
            MediaAction::Pause => "pause",
            MediaAction::SeekTo => "seekto",
            MediaAction::NextTrack => "nexttrack",
            MediaAction::PreviousTrack => "previoustrack",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaPlaybackState {
    None,
    Paused,
    Playing,
}

impl MediaPlaybackState {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaPlaybackState::None => "none",
            MediaPlaybackState::Paused => "paused",
            MediaPlaybackState::Playing => "playing",
        }
    }
}

/// The OS-level control surface.
pub trait MediaSession {
    fn set_metadata(&mut self, title: &str);
    fn set_playback_state(&mut self, state: MediaPlaybackState);
    fn set_position_state(&mut self, position: f64, duration: f64);
    /// (Re-)install handlers for `actions`, replacing earlier ones.
    fn register_actions(&mut self, actions: &[MediaAction]);
}

/// Outbound notifications. Register once; replace at any time.
pub trait PlaybackListener {
    fn on_playback_change(&mut self, playing: bool);

    fn on_seek_requested(&mut self, _time: f64) {}

    fn on_track_ended(&mut self) {}

    /// A decode or stream failure; playback has already halted.
    fn on_error(&mut self, _reason: &str) {}

    /// A control-surface command. Seeks are forwarded to
    /// [`on_seek_requested`](Self::on_seek_requested) unless overridden.
    fn on_transport_request(&mut self, command: TransportCommand) {
        if let TransportCommand::SeekTo(time) = command {
            self.on_seek_requested(time);
        }
    }
}

/// Loopback output kept running alongside the main output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeepAliveTap {
    gain: f32,
}

impl KeepAliveTap {
    pub fn for_device(device: DeviceClass) -> Self {
        KeepAliveTap {
            gain: if device.is_constrained() { 1.0 } else { 0.0 },
        }
    }

    pub fn is_muted(&self) -> bool {
        self.gain == 0.0
    }

    /// Copy the graph output into the loopback buffers at the tap gain.
    pub fn render(&self, left: &[f32], right: &[f32], out_left: &mut [f32], out_right: &mut [f32]) {
        for (o, s) in out_left.iter_mut().zip(left) {
            *o = s * self.gain;
        }
        for (o, s) in out_right.iter_mut().zip(right) {
            *o = s * self.gain;
        }
    }
}

#[derive(Default)]
pub struct TransportBridge {
    session: Option<Box<dyn MediaSession>>,
    title: Option<String>,
}

impl TransportBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the control surface and install every handler.
    pub fn attach(&mut self, mut session: Box<dyn MediaSession>) {
        if let Some(title) = &self.title {
            session.set_metadata(title);
        }
        session.register_actions(&MediaAction::ALL);
        self.session = Some(session);
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Publish new metadata. Some hosts drop handlers when metadata is
    /// replaced, so every action is registered again.
    pub fn notify_metadata_changed(&mut self, title: &str) {
        self.title = Some(title.to_owned());
        if let Some(session) = &mut self.session {
            session.set_metadata(title);
            session.register_actions(&MediaAction::ALL);
            log::debug!("transport: metadata '{title}', handlers re-registered");
        }
    }

    pub fn notify_position_changed(&mut self, position: f64, duration: f64) {
        if !(duration.is_finite() && duration > 0.0) {
            return;
        }
        if let Some(session) = &mut self.session {
            session.set_position_state(position.clamp(0.0, duration), duration);
        }
    }

    pub fn notify_playback_state(&mut self, playing: bool, has_source: bool) {
        let state = match (playing, has_source) {
            (true, _) => MediaPlaybackState::Playing,
            (false, true) => MediaPlaybackState::Paused,
            (false, false) => MediaPlaybackState::None,
        };
        if let Some(session) = &mut self.session {
            session.set_playback_state(state);
        }
    }
}

impl std::fmt::Debug for TransportBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportBridge")
            .field("attached", &self.session.is_some())
            .field("title", &self.title)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Log {
        calls: Vec<String>,
    }

    struct Recorder(Rc<RefCell<Log>>);

    impl MediaSession for Recorder {
        fn set_metadata(&mut self, title: &str) {
            self.0.borrow_mut().calls.push(format!("metadata:{title}"));
        }
        fn set_playback_state(&mut self, state: MediaPlaybackState) {
            self.0.borrow_mut().calls.push(format!("state:{}", state.as_str()));
        }
        fn set_position_state(&mut self, position: f64, duration: f64) {
            self.0.borrow_mut().calls.push(format!("position:{position}/{duration}"));
        }
        fn register_actions(&mut self, actions: &[MediaAction]) {
            self.0.borrow_mut().calls.push(format!("register:{}", actions.len()));
        }
    }

    #[test]
    fn metadata_change_reregisters_handlers() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut bridge = TransportBridge::new();
        bridge.attach(Box::new(Recorder(log.clone())));
        bridge.notify_metadata_changed("Track A");
        bridge.notify_metadata_changed("Track B");
        assert_eq!(
            log.borrow().calls,
            vec!["register:5", "metadata:Track A", "register:5", "metadata:Track B", "register:5"]
        );
    }

    #[test]
    fn position_is_clamped_and_unknown_duration_skipped() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut bridge = TransportBridge::new();
        bridge.attach(Box::new(Recorder(log.clone())));
        bridge.notify_position_changed(12.0, 10.0);
        bridge.notify_position_changed(1.0, f64::NAN);
        bridge.notify_playback_state(false, true);
        assert_eq!(log.borrow().calls[1..], ["position:10/10", "state:paused"]);
    }

    #[test]
    fn keep_alive_muted_only_on_desktop() {
        let input = [0.5, -0.5];
        let (mut l, mut r) = ([9.0; 2], [9.0; 2]);

        let desktop = KeepAliveTap::for_device(DeviceClass::Desktop);
        assert!(desktop.is_muted());
        desktop.render(&input, &input, &mut l, &mut r);
        assert_eq!(l, [0.0, -0.0]);

        let mobile = KeepAliveTap::for_device(DeviceClass::Mobile);
        assert!(!mobile.is_muted());
        mobile.render(&input, &input, &mut l, &mut r);
        assert_eq!(r, input);
    }

    #[test]
    fn default_transport_request_forwards_seeks() {
        #[derive(Default)]
        struct Seeks(Vec<f64>);
        impl PlaybackListener for Seeks {
            fn on_playback_change(&mut self, _: bool) {}
            fn on_seek_requested(&mut self, time: f64) {
                self.0.push(time);
            }
        }
        let mut s = Seeks::default();
        s.on_transport_request(TransportCommand::Play);
        s.on_transport_request(TransportCommand::SeekTo(42.5));
        assert_eq!(s.0, vec![42.5]);
    }

    #[test]
    fn commands_serialize_with_action_tag() {
        let json = serde_json::to_string(&TransportCommand::SeekTo(3.0)).unwrap();
        assert_eq!(json, r#"{"action":"seekTo","time":3.0}"#);
        let cmd: TransportCommand = serde_json::from_str(r#"{"action":"skipForward"}"#).unwrap();
        assert_eq!(cmd, TransportCommand::SkipForward);
    }
}
