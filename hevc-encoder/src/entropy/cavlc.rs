//! Static-table entropy backend.
//!
//! Every syntax element maps to plain bits: flags are one bit, indices are
//! truncated unary or Exp-Golomb. Coefficient blocks are written as the
//! scan position of the last nonzero coefficient followed by, in reverse
//! scan order, a significance bit, `|level| - 1` and a sign bit.

use hevc_encoder_core::BitWriter;

use super::{check_block, scan, EntropyBackend};
use crate::error::{HevcError, Result};
use crate::tree::ComponentType;

/// Static-table backend writing into a [`BitWriter`].
#[derive(Debug, Default)]
pub struct CavlcWriter {
    writer: BitWriter,
}

impl CavlcWriter {
    /// Create a new writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write into an existing bit writer, e.g. one with an output limit.
    pub fn with_writer(writer: BitWriter) -> Self {
        Self { writer }
    }

    /// Bits written so far.
    pub fn position(&self) -> usize {
        self.writer.position()
    }

    /// Written data.
    pub fn data(&self) -> &[u8] {
        self.writer.data()
    }

    /// Consume and return the written data.
    pub fn into_data(self) -> Vec<u8> {
        self.writer.into_data()
    }
}

impl EntropyBackend for CavlcWriter {
    fn write_fixed_length(&mut self, value: u32, bits: u8) -> Result<()> {
        self.writer.write_bits(value, bits)?;
        Ok(())
    }

    fn write_unsigned_code(&mut self, value: u32) -> Result<()> {
        self.writer.write_ue(value)?;
        Ok(())
    }

    fn write_signed_code(&mut self, value: i32) -> Result<()> {
        self.writer.write_se(value)?;
        Ok(())
    }

    fn write_flag(&mut self, flag: bool) -> Result<()> {
        self.writer.write_bit(flag)?;
        Ok(())
    }

    fn write_unary_max(&mut self, value: u32, max: u32) -> Result<()> {
        if value > max {
            return Err(HevcError::InvariantViolation(format!(
                "unary value {} exceeds maximum {}",
                value, max
            )));
        }
        for _ in 0..value {
            self.writer.write_bit(true)?;
        }
        if value < max {
            self.writer.write_bit(false)?;
        }
        Ok(())
    }

    fn write_exp_golomb(&mut self, value: u32, order: u8) -> Result<()> {
        self.writer.write_exp_golomb_k(value, order)?;
        Ok(())
    }

    fn write_coefficient_block(
        &mut self,
        coeffs: &[i32],
        width: u32,
        height: u32,
        _component: ComponentType,
    ) -> Result<()> {
        check_block(coeffs, width, height)?;
        let order = scan::diagonal_scan(width, height);
        let level = |n: usize| {
            let (x, y) = order[n];
            coeffs[(y * width + x) as usize]
        };

        let Some(last) = (0..order.len()).rev().find(|&n| level(n) != 0) else {
            return Ok(());
        };
        self.writer.write_ue(last as u32)?;

        for n in (0..=last).rev() {
            let value = level(n);
            if n != last {
                self.writer.write_bit(value != 0)?;
            }
            if value != 0 {
                self.writer.write_ue(value.unsigned_abs() - 1)?;
                self.writer.write_bit(value < 0)?;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.write_rbsp_trailing_bits()?;
        Ok(())
    }
}
