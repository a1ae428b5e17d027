//! Error types

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Monitoring session error: {0}")]
    Session(String),
}

/// Failures at the boundary with the audio engine.
///
/// None of these reach the end user: setup failures trigger a fallback,
/// request failures are replaced by a zero value for the failed facet.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("{0} is not supported by the producer")]
    Unsupported(&'static str),

    #[error("Setup failed: {0}")]
    SetupFailed(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Timed out after {0} ms")]
    Timeout(u64),

    #[error("Transport closed")]
    Closed,
}
