use thiserror::Error;

/// Errors surfaced by the engine.
///
/// None of these are fatal: every failure leaves the engine `Idle` or in
/// `Error`, ready for a fresh `play`. Out-of-range parameters are never an
/// error; they are clamped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Malformed or unsupported audio data.
    #[error("decode failure: {0}")]
    Decode(String),

    /// Network or transport failure of a streamed source.
    #[error("stream failure: {0}")]
    Stream(String),

    /// An operation needed the filter graph before `initialize()`.
    #[error("filter graph is not initialized")]
    GraphNotInitialized,

    /// Rejected engine configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_reason() {
        let e = EngineError::Decode("truncated RIFF header".into());
        assert_eq!(e.to_string(), "decode failure: truncated RIFF header");
        let e = EngineError::Stream("connection reset".into());
        assert!(e.to_string().contains("connection reset"));
    }
}
