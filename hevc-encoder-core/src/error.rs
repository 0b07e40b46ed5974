//! Error types for the bit-level layer.
//!
//! Everything that writes or reads raw bits reports failures through [`Error`].
//! Higher layers wrap it so an I/O fault raised deep inside an entropy backend
//! surfaces unchanged to the caller.

use thiserror::Error;

/// Main error type for bit-level operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Bitstream errors (truncated input, malformed codes).
    #[error("Bitstream fault: {0}")]
    Bitstream(#[from] BitstreamError),

    /// I/O errors from an underlying sink.
    #[error("Sink I/O: {0}")]
    Io(#[from] std::io::Error),

    /// A caller passed an argument outside the coder's range.
    #[error("Invalid argument: {0}")]
    InvalidParameter(String),

    /// The sink refused further output.
    #[error("Sink closed after {written} bits")]
    SinkClosed { written: usize },
}

/// Bitstream errors.
#[derive(Error, Debug)]
pub enum BitstreamError {
    /// The reader ran past the last byte.
    #[error("Read past the end of the buffer")]
    UnexpectedEnd,

    /// An Exp-Golomb code does not fit in 32 bits.
    #[error("Exp-Golomb code exceeds 32 bits")]
    ExpGolombOverflow,

    /// A value does not fit into the requested number of bits.
    #[error("Value {value} does not fit in {bits} bits")]
    ValueOverflow { value: u64, bits: u8 },

    /// A syntax element value outside its legal range.
    #[error("{element} = {value} is not codable")]
    InvalidSyntax { element: String, value: i64 },
}

/// Result type alias for bit-level operations.
pub type Result<T> = std::result::Result<T, Error>;
