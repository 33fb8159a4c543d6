//! Error types for the heartlog engine.

use crate::sink::SinkError;

/// Top-level error type for the telemetry emitter.
#[derive(Debug, thiserror::Error)]
pub enum HeartlogError {
    /// Caller supplied a value outside the accepted domain (e.g. interval <= 0).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// State store read or write failed; the requested change did not take effect.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Log sink append or clear failed.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// Async runtime unavailable or misused.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// Process host adapter refused a request.
    #[error("host error: {0}")]
    Host(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, HeartlogError>;
