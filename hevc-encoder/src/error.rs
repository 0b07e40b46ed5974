//! HEVC encoder error types.
//!
//! Configuration problems are reported once at setup. Everything raised while
//! coding a picture aborts that picture only; the caller decides whether to
//! continue with the next one.

use thiserror::Error;

/// HEVC encoder error type.
#[derive(Error, Debug)]
pub enum HevcError {
    /// The GOP pattern cannot be turned into a causal reference schedule.
    #[error("Invalid GOP structure: {0}")]
    InvalidGopStructure(String),

    /// The entropy backend failed to accept a write.
    #[error("Entropy backend I/O fault: {0}")]
    BackendIo(#[from] hevc_encoder_core::Error),

    /// Encoder configuration error.
    #[error("Encoder config error: {0}")]
    Config(String),

    /// A reference picture set cannot be signalled as given.
    #[error("Invalid reference picture set: {0}")]
    InvalidRps(String),

    /// The coding tree contradicts a value the syntax infers.
    #[error("Internal consistency violation: {0}")]
    InvariantViolation(String),
}

impl HevcError {
    /// Whether the error only affects the picture being coded.
    pub fn is_picture_local(&self) -> bool {
        matches!(self, Self::BackendIo(_) | Self::InvariantViolation(_))
    }
}

impl From<std::io::Error> for HevcError {
    fn from(err: std::io::Error) -> Self {
        HevcError::BackendIo(err.into())
    }
}

/// Result type for HEVC encoder operations.
pub type Result<T> = std::result::Result<T, HevcError>;
