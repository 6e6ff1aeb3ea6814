//! Cursor over a byte buffer for decoding map file fields.
//!
//! Fixed-width integers are big-endian. Strings are prefixed with their
//! byte length encoded as an unsigned variable-byte integer: each byte
//! carries 7 data bits, and a set high bit (0x80) means another byte
//! follows.

use crate::error::FormatError;

use super::range_reader::{read_u16_be, read_u32_be, read_u64_be};

/// Maximum number of bytes of an unsigned variable-byte integer (u32).
const MAX_VBE_BYTES: usize = 5;

/// Sequential reader over a borrowed byte slice.
///
/// Every read checks the remaining length and returns
/// [`FormatError::Truncated`] instead of panicking.
#[derive(Debug, Clone)]
pub struct ReadBuffer<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ReadBuffer<'a> {
    /// Create a buffer positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Current read position.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Number of unread bytes.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    /// Take the next `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], FormatError> {
        if len > self.remaining() {
            return Err(FormatError::Truncated {
                offset: self.position,
                needed: len,
                available: self.remaining(),
            });
        }
        let bytes = &self.data[self.position..self.position + len];
        self.position += len;
        Ok(bytes)
    }

    /// Skip `len` bytes.
    pub fn skip(&mut self, len: usize) -> Result<(), FormatError> {
        self.read_bytes(len).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, FormatError> {
        Ok(read_u16_be(self.read_bytes(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32, FormatError> {
        Ok(read_u32_be(self.read_bytes(4)?))
    }

    pub fn read_i32(&mut self) -> Result<i32, FormatError> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_u64(&mut self) -> Result<u64, FormatError> {
        Ok(read_u64_be(self.read_bytes(8)?))
    }

    pub fn read_i64(&mut self) -> Result<i64, FormatError> {
        Ok(self.read_u64()? as i64)
    }

    /// Read an unsigned variable-byte encoded integer.
    pub fn read_unsigned_vbe(&mut self) -> Result<u32, FormatError> {
        let start = self.position;
        let mut value: u32 = 0;
        let mut shift = 0;

        for _ in 0..MAX_VBE_BYTES {
            let byte = self.read_u8()?;
            value |= ((byte & 0x7F) as u32) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }

        Err(FormatError::InvalidString {
            offset: start,
            message: "variable-byte length exceeds 5 bytes".to_string(),
        })
    }

    /// Read a length-prefixed UTF-8 string.
    ///
    /// A zero length is reported as `None`, matching the format's notion
    /// of a null string.
    pub fn read_utf8(&mut self) -> Result<Option<String>, FormatError> {
        let len = self.read_unsigned_vbe()? as usize;
        self.read_utf8_with_len(len)
    }

    /// Read a UTF-8 string of a known byte length.
    pub fn read_utf8_with_len(&mut self, len: usize) -> Result<Option<String>, FormatError> {
        if len == 0 {
            return Ok(None);
        }
        let offset = self.position;
        let bytes = self.read_bytes(len)?;
        match std::str::from_utf8(bytes) {
            Ok(s) => Ok(Some(s.to_string())),
            Err(e) => Err(FormatError::InvalidString {
                offset,
                message: e.to_string(),
            }),
        }
    }
}
