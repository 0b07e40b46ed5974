//! MSB-first bit packing for syntax elements, and the matching reader.
//!
//! The writer is the sink every entropy backend ends in. The reader exists so
//! that emitted syntax can be parsed back in tests and diagnostics.

use crate::error::{BitstreamError, Error, Result};

/// Packs syntax elements MSB first into a growable byte buffer.
///
/// Bits are packed MSB first. An optional limit models a fixed-size output
/// buffer: once it is reached every further write fails with
/// [`Error::SinkClosed`] and nothing more is appended.
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    data: Vec<u8>,
    bit_pos: u8,
    limit: Option<usize>,
}

impl BitWriter {
    /// Empty writer without a bit limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty writer with `bytes` preallocated.
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            data: Vec::with_capacity(bytes),
            ..Self::default()
        }
    }

    /// Create a writer that accepts at most `max_bits` bits.
    pub fn with_limit(max_bits: usize) -> Self {
        Self {
            limit: Some(max_bits),
            ..Self::default()
        }
    }

    /// Number of bits written so far.
    pub fn position(&self) -> usize {
        if self.bit_pos == 0 {
            self.data.len() * 8
        } else {
            (self.data.len() - 1) * 8 + self.bit_pos as usize
        }
    }

    /// Whether the next bit starts a new byte.
    pub fn is_byte_aligned(&self) -> bool {
        self.bit_pos == 0
    }

    fn reserve_bits(&self, n: usize) -> Result<()> {
        match self.limit {
            Some(limit) if self.position() + n > limit => Err(Error::SinkClosed {
                written: self.position(),
            }),
            _ => Ok(()),
        }
    }

    /// Append one bit.
    pub fn write_bit(&mut self, bit: bool) -> Result<()> {
        self.write_bits(bit as u32, 1)
    }

    /// Write the `n` low bits of `value`, MSB first.
    ///
    /// `n` may be at most 32 and `value` must fit into `n` bits.
    pub fn write_bits(&mut self, value: u32, n: u8) -> Result<()> {
        if n > 32 {
            return Err(Error::InvalidParameter(
                "Cannot write more than 32 bits at once".into(),
            ));
        }
        if n < 32 && (value >> n) != 0 {
            return Err(BitstreamError::ValueOverflow {
                value: value as u64,
                bits: n,
            }
            .into());
        }
        self.reserve_bits(n as usize)?;

        let mut remaining = n;
        while remaining > 0 {
            if self.bit_pos == 0 {
                self.data.push(0);
            }
            let free = 8 - self.bit_pos;
            let take = free.min(remaining);
            let shift = remaining - take;
            let chunk = ((value >> shift) & ((1u32 << take) - 1)) as u8;
            if let Some(last) = self.data.last_mut() {
                *last |= chunk << (free - take);
            }
            self.bit_pos = (self.bit_pos + take) % 8;
            remaining -= take;
        }
        Ok(())
    }

    /// Write an unsigned Exp-Golomb coded value (ue(v)).
    pub fn write_ue(&mut self, value: u32) -> Result<()> {
        let value_plus_1 = value as u64 + 1;
        let len = 64 - value_plus_1.leading_zeros() as u8;
        let leading_zeros = len - 1;

        self.reserve_bits(leading_zeros as usize * 2 + 1)?;
        if leading_zeros > 0 {
            self.write_bits(0, leading_zeros.min(32))?;
        }
        // value + 1 needs at most 33 bits
        if len > 32 {
            self.write_bit(true)?;
            self.write_bits(value_plus_1 as u32, 32)
        } else {
            self.write_bits(value_plus_1 as u32, len)
        }
    }

    /// Write a signed Exp-Golomb coded value (se(v)).
    pub fn write_se(&mut self, value: i32) -> Result<()> {
        let magnitude = value.unsigned_abs();
        let ue = if value <= 0 {
            magnitude.checked_mul(2)
        } else {
            magnitude.checked_mul(2).map(|v| v - 1)
        };
        match ue {
            Some(ue) => self.write_ue(ue),
            None => Err(BitstreamError::ExpGolombOverflow.into()),
        }
    }

    /// Write a k-th order Exp-Golomb code with a unary prefix of ones.
    ///
    /// This is the escape binarization used for coefficient remainders.
    pub fn write_exp_golomb_k(&mut self, value: u32, k: u8) -> Result<()> {
        if k > 31 {
            return Err(Error::InvalidParameter(format!(
                "Exp-Golomb order {} out of range",
                k
            )));
        }
        let mut symbol = value as u64;
        let mut order = k as u32;
        let mut prefix = 0usize;
        while symbol >= (1u64 << order) {
            symbol -= 1u64 << order;
            order += 1;
            prefix += 1;
            if order > 32 {
                return Err(BitstreamError::ExpGolombOverflow.into());
            }
        }
        self.reserve_bits(prefix + 1 + order as usize)?;
        for _ in 0..prefix {
            self.write_bit(true)?;
        }
        self.write_bit(false)?;
        if order == 32 {
            self.write_bits(symbol as u32, 32)
        } else {
            self.write_bits(symbol as u32, order as u8)
        }
    }

    /// Pad with zero bits up to the next byte boundary.
    pub fn align_to_byte(&mut self) -> Result<()> {
        if self.bit_pos != 0 {
            let pad = 8 - self.bit_pos;
            self.write_bits(0, pad)?;
        }
        Ok(())
    }

    /// `rbsp_trailing_bits()`: a stop bit, then zero padding.
    pub fn write_rbsp_trailing_bits(&mut self) -> Result<()> {
        self.write_bit(true)?;
        self.align_to_byte()
    }

    /// Get the written data. A partial last byte is zero padded.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume the writer and return its bytes.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// Reads back what [`BitWriter`] produced.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    byte_pos: usize,
    bit_pos: u8,
}

impl<'a> BitReader<'a> {
    /// Reader positioned at the first bit of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    /// Bits consumed so far.
    pub fn position(&self) -> usize {
        self.byte_pos * 8 + self.bit_pos as usize
    }

    /// Bits left before the end of the buffer.
    pub fn remaining_bits(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.position())
    }

    /// Whether the next bit starts a new byte.
    pub fn is_byte_aligned(&self) -> bool {
        self.bit_pos == 0
    }

    /// Consume one bit.
    pub fn read_bit(&mut self) -> Result<bool> {
        let byte = *self
            .data
            .get(self.byte_pos)
            .ok_or(BitstreamError::UnexpectedEnd)?;
        let bit = (byte >> (7 - self.bit_pos)) & 1;
        self.bit_pos += 1;
        if self.bit_pos == 8 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
        Ok(bit != 0)
    }

    /// Consume `n` bits (at most 32), MSB first.
    pub fn read_bits(&mut self, n: u8) -> Result<u32> {
        if n > 32 {
            return Err(Error::InvalidParameter(
                "Cannot read more than 32 bits at once".into(),
            ));
        }
        if self.remaining_bits() < n as usize {
            return Err(BitstreamError::UnexpectedEnd.into());
        }

        let mut value: u64 = 0;
        let mut remaining = n;
        while remaining > 0 {
            let avail = 8 - self.bit_pos;
            let take = avail.min(remaining);
            let byte = self.data[self.byte_pos] as u64;
            let chunk = (byte >> (avail - take)) & ((1u64 << take) - 1);
            value = (value << take) | chunk;
            self.bit_pos += take;
            if self.bit_pos == 8 {
                self.bit_pos = 0;
                self.byte_pos += 1;
            }
            remaining -= take;
        }
        Ok(value as u32)
    }

    /// Consume a ue(v) code.
    pub fn read_ue(&mut self) -> Result<u32> {
        let mut leading_zeros = 0u8;
        while !self.read_bit()? {
            leading_zeros += 1;
            if leading_zeros > 32 {
                return Err(BitstreamError::ExpGolombOverflow.into());
            }
        }
        if leading_zeros == 0 {
            return Ok(0);
        }

        let suffix = if leading_zeros == 32 {
            self.read_bits(32)? as u64
        } else {
            self.read_bits(leading_zeros)? as u64
        };
        let value = (1u64 << leading_zeros) - 1 + suffix;
        u32::try_from(value).map_err(|_| BitstreamError::ExpGolombOverflow.into())
    }

    /// Consume an se(v) code.
    pub fn read_se(&mut self) -> Result<i32> {
        let ue = self.read_ue()? as i64;
        let value = if ue % 2 == 0 { -(ue / 2) } else { (ue + 1) / 2 };
        i32::try_from(value).map_err(|_| BitstreamError::ExpGolombOverflow.into())
    }

    /// Read a k-th order Exp-Golomb code with a unary prefix of ones.
    pub fn read_exp_golomb_k(&mut self, k: u8) -> Result<u32> {
        let mut order = k as u32;
        let mut base = 0u64;
        while self.read_bit()? {
            base += 1u64 << order;
            order += 1;
            if order > 32 {
                return Err(BitstreamError::ExpGolombOverflow.into());
            }
        }
        let suffix = if order == 32 {
            self.read_bits(32)? as u64
        } else {
            self.read_bits(order as u8)? as u64
        };
        u32::try_from(base + suffix).map_err(|_| BitstreamError::ExpGolombOverflow.into())
    }
}
