//! Playback — sources, the active session, and the controller state machine.

pub mod controller;
pub mod session;
pub mod source;

pub use controller::{EngineEvent, PlaybackController, PlaybackState};
pub use session::{PlaybackMode, PlaybackSession};
pub use source::{MemoryStream, Source, SourceStrategy, StreamHandle};
