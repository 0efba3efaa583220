//! Analysis — spectral estimation and EQ matching, off the render path.

pub mod matcher;
pub mod schedule;
pub mod spectrum;

pub use matcher::{MatchOutcome, MatchResult, compute_match, match_sources};
#[cfg(feature = "native")]
pub use schedule::TokioScheduler;
pub use schedule::{InlineScheduler, Scheduler, YieldNow};
pub use spectrum::{SpectralEstimator, SpectrumProfile, silence_floor_db};
