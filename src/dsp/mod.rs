//! DSP — the real-time signal path.
//!
//! Every stage processes stereo blocks in place on the render callback.

pub mod analyser;
pub mod context;
pub mod delay;
pub mod filter;
pub mod graph;
pub mod param;
pub mod reverb;
