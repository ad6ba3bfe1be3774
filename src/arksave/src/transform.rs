//! Actor transforms: the position, rotation and scale of placed objects.
//!
//! Transforms live in a table separate from the object blobs, packed as
//! `uuid (16) + 9 × f64` records and terminated by the nil UUID.

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cursor::ByteCursor;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector {
    pub const ONE: Vector = Vector::new(1.0, 1.0, 1.0);

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn read(cursor: &mut ByteCursor) -> Result<Self> {
        Ok(Self {
            x: cursor.read_f64()?,
            y: cursor.read_f64()?,
            z: cursor.read_f64()?,
        })
    }

    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        for c in [self.x, self.y, self.z] {
            out.extend_from_slice(&c.to_le_bytes());
        }
    }

    /// Euclidean distance to another point
    pub fn distance(&self, other: &Vector) -> f64 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Rotation in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rotator {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
}

impl Rotator {
    pub const fn new(pitch: f64, yaw: f64, roll: f64) -> Self {
        Self { pitch, yaw, roll }
    }

    pub fn read(cursor: &mut ByteCursor) -> Result<Self> {
        Ok(Self {
            pitch: cursor.read_f64()?,
            yaw: cursor.read_f64()?,
            roll: cursor.read_f64()?,
        })
    }

    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        for c in [self.pitch, self.yaw, self.roll] {
            out.extend_from_slice(&c.to_le_bytes());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActorTransform {
    pub position: Vector,
    pub rotation: Rotator,
    pub scale: Vector,
}

impl Default for ActorTransform {
    fn default() -> Self {
        Self {
            position: Vector::default(),
            rotation: Rotator::default(),
            scale: Vector::ONE,
        }
    }
}

impl ActorTransform {
    /// Encoded payload size
    pub const SIZE: usize = 72;

    /// Record size in the table, UUID included
    pub const RECORD_SIZE: usize = 16 + Self::SIZE;

    pub fn at(position: Vector) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn read(cursor: &mut ByteCursor) -> Result<Self> {
        Ok(Self {
            position: Vector::read(cursor)?,
            rotation: Rotator::read(cursor)?,
            scale: Vector::read(cursor)?,
        })
    }

    pub fn from_bytes(data: &[u8; Self::SIZE]) -> Self {
        let mut values = [0f64; 9];
        LittleEndian::read_f64_into(data, &mut values);
        Self {
            position: Vector::new(values[0], values[1], values[2]),
            rotation: Rotator::new(values[3], values[4], values[5]),
            scale: Vector::new(values[6], values[7], values[8]),
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = Vec::with_capacity(Self::SIZE);
        self.position.encode(&mut out);
        self.rotation.encode(&mut out);
        self.scale.encode(&mut out);

        let mut bytes = [0u8; Self::SIZE];
        bytes.copy_from_slice(&out);
        bytes
    }

    /// Encode a `uuid + payload` table record
    pub fn to_record(&self, uuid: &Uuid) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::RECORD_SIZE);
        out.extend_from_slice(uuid.as_bytes());
        out.extend_from_slice(&self.to_bytes());
        out
    }
}

/// One entry of a transform table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformRecord {
    pub uuid: Uuid,
    /// Offset of the 72-byte payload
    pub offset: usize,
    pub transform: ActorTransform,
}

/// Read records from the cursor position up to the nil-UUID sentinel
///
/// The sentinel is consumed but never yielded. A table without a sentinel
/// is truncated.
pub fn read_actor_transforms(cursor: &mut ByteCursor) -> Result<Vec<TransformRecord>> {
    let mut records = Vec::new();
    loop {
        let uuid = cursor.read_uuid()?;
        if uuid.is_nil() {
            break;
        }
        let offset = cursor.position();
        let transform = ActorTransform::read(cursor)?;
        records.push(TransformRecord {
            uuid,
            offset,
            transform,
        });
    }
    tracing::debug!(count = records.len(), "Read actor transforms");
    Ok(records)
}
