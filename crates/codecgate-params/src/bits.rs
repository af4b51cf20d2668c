//! # RBSP Bit Reader
//!
//! NAL payloads carry emulation-prevention bytes (`00 00 03`) that must be
//! removed before the raw byte sequence payload (RBSP) can be read as a
//! bitstream. [`BitReader`] then reads fixed-width fields and Exp-Golomb
//! codes MSB-first.

use crate::error::ParseError;

/// Longest Exp-Golomb prefix accepted before a code is treated as corrupt.
const MAX_GOLOMB_ZEROS: u32 = 31;

/// Strip emulation-prevention bytes from a NAL payload.
///
/// Any `0x03` that follows two zero bytes is dropped and the zero run resets.
pub fn to_rbsp(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len());
    let mut zeros = 0usize;
    for &byte in payload {
        if zeros >= 2 && byte == 0x03 {
            zeros = 0;
            continue;
        }
        zeros = if byte == 0 { zeros + 1 } else { 0 };
        out.push(byte);
    }
    out
}

/// MSB-first reader over an RBSP.
///
/// Every read names the syntax element it is reading so that a short buffer
/// produces an error pointing at the field that could not be completed.
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    unit: &'static str,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8], unit: &'static str) -> Self {
        Self { data, pos: 0, unit }
    }

    /// Bits not yet consumed.
    #[inline]
    pub fn bits_left(&self) -> usize {
        self.data.len() * 8 - self.pos
    }

    fn exhausted(&self, field: &'static str) -> ParseError {
        ParseError::Exhausted {
            unit: self.unit,
            field,
        }
    }

    /// Build an out-of-range error attributed to this reader's unit.
    pub fn out_of_range(&self, field: &'static str, value: u64) -> ParseError {
        ParseError::OutOfRange {
            unit: self.unit,
            field,
            value,
        }
    }

    #[inline]
    pub fn read_flag(&mut self, field: &'static str) -> Result<bool, ParseError> {
        if self.pos >= self.data.len() * 8 {
            return Err(self.exhausted(field));
        }
        let byte = self.data[self.pos / 8];
        let bit = (byte >> (7 - (self.pos % 8))) & 1;
        self.pos += 1;
        Ok(bit == 1)
    }

    /// Read an `n`-bit unsigned field (`n <= 32`).
    pub fn read_bits(&mut self, n: u32, field: &'static str) -> Result<u32, ParseError> {
        debug_assert!(n <= 32);
        if self.bits_left() < n as usize {
            return Err(self.exhausted(field));
        }
        let mut value = 0u64;
        for _ in 0..n {
            value = (value << 1) | u64::from(self.read_flag(field)?);
        }
        Ok(value as u32)
    }

    #[inline]
    pub fn read_u8(&mut self, field: &'static str) -> Result<u8, ParseError> {
        Ok(self.read_bits(8, field)? as u8)
    }

    pub fn skip_bits(&mut self, n: usize, field: &'static str) -> Result<(), ParseError> {
        if self.bits_left() < n {
            return Err(self.exhausted(field));
        }
        self.pos += n;
        Ok(())
    }

    /// Unsigned Exp-Golomb `ue(v)`.
    pub fn read_ue(&mut self, field: &'static str) -> Result<u32, ParseError> {
        let mut zeros = 0u32;
        while !self.read_flag(field)? {
            zeros += 1;
            if zeros > MAX_GOLOMB_ZEROS {
                return Err(self.out_of_range(field, u64::from(zeros)));
            }
        }
        let suffix = u64::from(self.read_bits(zeros, field)?);
        let value = (1u64 << zeros) - 1 + suffix;
        u32::try_from(value).map_err(|_| self.out_of_range(field, value))
    }

    /// Signed Exp-Golomb `se(v)`.
    pub fn read_se(&mut self, field: &'static str) -> Result<i32, ParseError> {
        let code = i64::from(self.read_ue(field)?);
        let value = if code % 2 == 1 {
            (code + 1) / 2
        } else {
            -(code / 2)
        };
        i32::try_from(value).map_err(|_| self.out_of_range(field, code as u64))
    }
}
