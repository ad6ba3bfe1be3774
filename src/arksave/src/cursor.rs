//! Bounds-checked byte cursor over an owned, mutable buffer.
//!
//! All multi-byte values are little-endian. Reads never return partial data:
//! running past the end of the buffer is an [`Error::Truncated`] carrying the
//! offset of the failed read.

use std::ops::Range;

use byteorder::{ByteOrder, LittleEndian};
use uuid::Uuid;

use crate::{Error, Result};

/// Byte buffer plus read/write position
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteCursor {
    data: Vec<u8>,
    position: usize,
}

impl ByteCursor {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, position: 0 }
    }

    pub fn from_slice(data: &[u8]) -> Self {
        Self::new(data.to_vec())
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Move the cursor; positions up to (and including) the end are valid
    pub fn set_position(&mut self, position: usize) -> Result<()> {
        if position > self.data.len() {
            return Err(Error::Truncated {
                offset: position,
                needed: 0,
                available: self.data.len(),
            });
        }
        self.position = position;
        Ok(())
    }

    /// Total buffer size in bytes
    #[inline]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    #[inline]
    pub fn is_at_end(&self) -> bool {
        self.position >= self.data.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    /// Consume `n` bytes, failing without moving if fewer are available
    fn take(&mut self, n: usize) -> Result<&[u8]> {
        let start = self.position;
        if self.remaining() < n {
            return Err(Error::Truncated {
                offset: start,
                needed: n,
                available: self.remaining(),
            });
        }
        self.position += n;
        Ok(&self.data[start..start + n])
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        self.take(n).map(<[u8]>::to_vec)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.take(2).map(LittleEndian::read_u16)
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        self.take(2).map(LittleEndian::read_i16)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.take(4).map(LittleEndian::read_u32)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.take(4).map(LittleEndian::read_i32)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.take(8).map(LittleEndian::read_u64)
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.take(8).map(LittleEndian::read_i64)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        self.take(4).map(LittleEndian::read_f32)
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        self.take(8).map(LittleEndian::read_f64)
    }

    /// Read a `u32` without advancing
    pub fn peek_u32(&self) -> Result<u32> {
        if self.remaining() < 4 {
            return Err(Error::Truncated {
                offset: self.position,
                needed: 4,
                available: self.remaining(),
            });
        }
        Ok(LittleEndian::read_u32(&self.data[self.position..]))
    }

    /// Read 16 raw bytes as a UUID
    pub fn read_uuid(&mut self) -> Result<Uuid> {
        let bytes = self.take(16)?;
        let mut raw = [0u8; 16];
        raw.copy_from_slice(bytes);
        Ok(Uuid::from_bytes(raw))
    }

    /// Read an `i32` count followed by that many UUIDs
    pub fn read_uuids(&mut self) -> Result<Vec<Uuid>> {
        let offset = self.position;
        let count = self.read_i32()?;
        let count = usize::try_from(count)
            .map_err(|_| Error::format(offset, format!("negative UUID count {count}")))?;
        (0..count).map(|_| self.read_uuid()).collect()
    }

    /// Read a length-prefixed string
    ///
    /// Positive lengths are single-byte characters, negative lengths are
    /// UTF-16LE code units; both include the trailing NUL.
    pub fn read_string(&mut self) -> Result<String> {
        let offset = self.position;
        let len = self.read_i32()?;

        if len == 0 {
            return Ok(String::new());
        }

        if len > 0 {
            let bytes = self.take(len as usize).map_err(|e| rewind(e, offset))?;
            let text = match std::str::from_utf8(bytes) {
                Ok(s) => s.to_string(),
                Err(_) => bytes.iter().map(|&b| b as char).collect(),
            };
            return Ok(text.trim_end_matches('\0').to_string());
        }

        let units = len.unsigned_abs() as usize;
        let bytes = self.take(units * 2).map_err(|e| rewind(e, offset))?;
        let utf16: Vec<u16> = bytes.chunks_exact(2).map(LittleEndian::read_u16).collect();
        Ok(String::from_utf16_lossy(&utf16)
            .trim_end_matches('\0')
            .to_string())
    }

    pub fn validate_u8(&mut self, expected: u8) -> Result<()> {
        let offset = self.position;
        let actual = self.read_u8()?;
        if actual != expected {
            return Err(Error::Mismatch {
                offset,
                expected: format!("0x{expected:02x}"),
                actual: format!("0x{actual:02x}"),
            });
        }
        Ok(())
    }

    pub fn validate_u32(&mut self, expected: u32) -> Result<()> {
        let offset = self.position;
        let actual = self.read_u32()?;
        if actual != expected {
            return Err(Error::Mismatch {
                offset,
                expected: format!("0x{expected:08x}"),
                actual: format!("0x{actual:08x}"),
            });
        }
        Ok(())
    }

    /// Write raw bytes at the position, extending the buffer past its end
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        let end = self.position + bytes.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[self.position..end].copy_from_slice(bytes);
        self.position = end;
    }

    pub fn write_u8(&mut self, value: u8) {
        self.write_bytes(&[value]);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_f64(&mut self, value: f64) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_uuid(&mut self, value: &Uuid) {
        self.write_bytes(value.as_bytes());
    }

    /// Write a length-prefixed string (single-byte when ASCII, UTF-16 otherwise)
    pub fn write_string(&mut self, value: &str) {
        let mut encoded = Vec::new();
        encode_string(&mut encoded, value);
        self.write_bytes(&encoded);
    }

    /// Overwrite bytes at `offset` without moving the cursor
    ///
    /// The replacement must fit inside the buffer; nothing is relocated.
    pub fn replace_bytes(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        let end = match offset.checked_add(bytes.len()) {
            Some(end) if end <= self.data.len() => end,
            _ => {
                return Err(Error::Truncated {
                    offset,
                    needed: bytes.len(),
                    available: self.data.len().saturating_sub(offset),
                })
            }
        };
        self.data[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    /// Replace `range` with `bytes`, shifting everything after it
    ///
    /// This is the only length-changing edit. A cursor positioned after the
    /// range moves with the bytes it was pointing at.
    pub fn splice(&mut self, range: Range<usize>, bytes: &[u8]) -> Result<()> {
        if range.start > range.end || range.end > self.data.len() {
            return Err(Error::Truncated {
                offset: range.start,
                needed: range.end.saturating_sub(range.start),
                available: self.data.len().saturating_sub(range.start),
            });
        }
        let removed = range.end - range.start;
        if self.position >= range.end {
            self.position = self.position - removed + bytes.len();
        } else if self.position > range.start {
            self.position = range.start;
        }
        self.data.splice(range, bytes.iter().copied());
        Ok(())
    }

    /// Hex dump of up to `n` bytes at the position, for diagnostics
    pub fn read_bytes_as_hex(&self, n: usize) -> String {
        let end = self.position.saturating_add(n).min(self.data.len());
        hex::encode_upper(&self.data[self.position.min(end)..end])
    }
}

/// Attribute a truncated payload read to the start of its length prefix
fn rewind(err: Error, offset: usize) -> Error {
    match err {
        Error::Truncated {
            needed, available, ..
        } => Error::Truncated {
            offset,
            needed: needed + 4,
            available: available + 4,
        },
        other => other,
    }
}

/// Append the length-prefixed encoding of `value` to `out`
pub(crate) fn encode_string(out: &mut Vec<u8>, value: &str) {
    if value.is_empty() {
        out.extend_from_slice(&0i32.to_le_bytes());
        return;
    }

    if value.is_ascii() {
        out.extend_from_slice(&(value.len() as i32 + 1).to_le_bytes());
        out.extend_from_slice(value.as_bytes());
        out.push(0);
        return;
    }

    let units: Vec<u16> = value.encode_utf16().chain(std::iter::once(0)).collect();
    out.extend_from_slice(&(-(units.len() as i32)).to_le_bytes());
    for unit in units {
        out.extend_from_slice(&unit.to_le_bytes());
    }
}
