//! Compressed object blob format.
//!
//! Embedded objects (cryopod contents, uploaded creatures) are stored as:
//! - Bytes 0-3: Magic (`0x0406`)
//! - Bytes 4-7: Inflated size
//! - Bytes 8-11: Name table offset (into the expanded stream)
//! - Bytes 12+: zlib payload
//!
//! The inflated payload still needs [`wildcard::expand`]. The expanded stream
//! is `[property stream][u32 name_count][name_count × string]`.

pub mod wildcard;

use std::io::Read;

use byteorder::{ByteOrder, LittleEndian};
use flate2::read::ZlibDecoder;

use crate::cursor::ByteCursor;
use crate::names::{SaveContext, DYNAMIC_NAME_FLAG};
use crate::{Error, Result};

/// Expected header magic
pub const MAGIC: u32 = 0x0406;

/// Header size in bytes
pub const HEADER_SIZE: usize = 12;

/// Compressed blob header (12 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Size of the zlib output before wildcard expansion
    pub inflated_size: u32,
    /// Offset of the name table in the expanded stream
    pub names_offset: u32,
}

impl Header {
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::Truncated {
                offset: 0,
                needed: HEADER_SIZE,
                available: data.len(),
            });
        }

        let magic = LittleEndian::read_u32(&data[0..4]);
        if magic != MAGIC {
            return Err(Error::InvalidMagic {
                expected: MAGIC,
                actual: magic,
            });
        }

        Ok(Self {
            inflated_size: LittleEndian::read_u32(&data[4..8]),
            names_offset: LittleEndian::read_u32(&data[8..12]),
        })
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        LittleEndian::write_u32(&mut out[0..4], MAGIC);
        LittleEndian::write_u32(&mut out[4..8], self.inflated_size);
        LittleEndian::write_u32(&mut out[8..12], self.names_offset);
        out
    }
}

/// Result of expanding a compressed blob
#[derive(Debug, Clone)]
pub struct Decompressed {
    pub header: Header,
    /// Expanded stream, positioned at 0
    pub cursor: ByteCursor,
    /// Name table loaded from the stream, with constants attached and synthesis on
    pub context: SaveContext,
}

impl Decompressed {
    /// The property stream portion (everything before the name table)
    pub fn property_bytes(&self) -> &[u8] {
        let end = (self.header.names_offset as usize).min(self.cursor.size());
        &self.cursor.as_bytes()[..end]
    }
}

/// Inflate a zlib payload, checking the declared size
pub fn inflate(compressed: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(compressed);
    let mut inflated = Vec::with_capacity(expected_size);
    decoder
        .read_to_end(&mut inflated)
        .map_err(Error::Decompression)?;

    if inflated.len() != expected_size {
        return Err(Error::DecompressionSize {
            expected: expected_size,
            actual: inflated.len(),
        });
    }

    Ok(inflated)
}

/// Decompress a compressed object blob and load its name table
pub fn decompress(data: &[u8]) -> Result<Decompressed> {
    let header = Header::from_bytes(data)?;

    let payload = &data[HEADER_SIZE..];
    if payload.is_empty() {
        return Err(Error::format(HEADER_SIZE, "no compressed data after header"));
    }

    let inflated = inflate(payload, header.inflated_size as usize)?;
    let expanded = wildcard::expand(&inflated)?;
    tracing::debug!(
        inflated = inflated.len(),
        expanded = expanded.len(),
        names_offset = header.names_offset,
        "Expanded compressed blob"
    );

    let mut cursor = ByteCursor::new(expanded);
    let context = read_name_table(&mut cursor, header.names_offset as usize)?;
    cursor.set_position(0)?;

    Ok(Decompressed {
        header,
        cursor,
        context,
    })
}

/// Read `u32 count` + `count` strings at `offset` into a fresh context
fn read_name_table(cursor: &mut ByteCursor, offset: usize) -> Result<SaveContext> {
    cursor.set_position(offset)?;
    let count = cursor.read_u32()?;

    let mut context = SaveContext::new();
    for i in 0..count {
        let name = cursor.read_string()?;
        context.insert(i | DYNAMIC_NAME_FLAG, name);
    }
    context.attach_constant_names();
    context.set_generate_unknown_names(true);

    tracing::debug!(names = count, "Loaded name table");
    Ok(context)
}
