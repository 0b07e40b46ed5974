//! # HEVC Encoder Core
//!
//! Bit-level building blocks shared by the HEVC encoder crates:
//! - Error handling types
//! - MSB-first bit writer with Exp-Golomb helpers
//! - A matching bit reader used to parse emitted syntax back

pub mod bitstream;
pub mod error;

pub use bitstream::{BitReader, BitWriter};
pub use error::{BitstreamError, Error, Result};
