//! # arksave
//!
//! ARK world save codec - object blob decompression, property parsing, and
//! structural editing.
//!
//! Every world object in a save is a name-interned, typed-property byte blob
//! addressed by a UUID. This library provides functionality to:
//! - Expand compressed object blobs (zlib + wildcard expansion) and load their name tables
//! - Read and patch sentinel-terminated property streams directly on raw bytes
//! - Retarget identities (UUID substitution, name renumbering, name-id remapping)
//! - Store blobs and actor transforms, and move whole object subgraphs between saves
//!
//! ## Example
//!
//! ```no_run
//! use std::fs;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let compressed = fs::read("cryopod.bin")?;
//!
//! // Inflate, expand and load the embedded name table
//! let mut expanded = arksave::decompress(&compressed)?;
//! let properties = arksave::read_properties(&mut expanded.cursor, &expanded.context)?;
//!
//! for property in &properties {
//!     println!("{} = {:?}", property.name, property.value);
//! }
//! # Ok(())
//! # }
//! ```

pub mod compressed;
pub mod cursor;
pub mod editor;
pub mod names;
pub mod object;
pub mod property;
pub mod store;
pub mod template;
pub mod transform;
pub mod value_type;

use uuid::Uuid;

// Re-export commonly used items
#[doc(inline)]
pub use compressed::{decompress, wildcard::expand as wildcard_expand, Decompressed, Header};
#[doc(inline)]
pub use cursor::ByteCursor;
#[doc(inline)]
pub use editor::{
    find_byte_sequence, find_names, renumber_name, replace_name_ids, replace_uuid, UuidMap,
};
#[doc(inline)]
pub use names::{NameId, SaveContext, DYNAMIC_NAME_FLAG};
#[doc(inline)]
pub use object::{GameObject, ObjectKind};
#[doc(inline)]
pub use property::{
    patch_property, read_properties, read_property, ObjectRef, Property, PropertyWriter,
    StructValue, TypeTree, Value,
};
#[doc(inline)]
pub use store::{MemoryStore, ObjectDatabase, ObjectStore, ReaderConfig};
#[doc(inline)]
pub use template::{export_object, export_subgraph, import_subgraph, ImportResult, Template};
#[doc(inline)]
pub use transform::{ActorTransform, Rotator, Vector};
#[doc(inline)]
pub use value_type::ValueType;

/// Broad class of an [`Error`], used by callers to decide whether to recover
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed or desynchronized bytes; fatal to the current decode
    Format,
    /// Corrupt compressed payload
    Decompression,
    /// Missing precondition on the destination save (names, identities)
    Identity,
    /// Unknown UUID; the caller decides the fallback
    NotFound,
    /// Filesystem or side-file problems
    Io,
}

/// Errors from decoding and editing save data
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Unexpected end of data at offset {offset}: need {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Invalid magic: expected 0x{expected:04x}, got 0x{actual:08x}")]
    InvalidMagic { expected: u32, actual: u32 },

    #[error("Unexpected value at offset {offset}: expected {expected}, got {actual}")]
    Mismatch {
        offset: usize,
        expected: String,
        actual: String,
    },

    #[error("Unknown value type {name:?} at offset {offset}")]
    UnknownValueType { name: String, offset: usize },

    #[error("Unknown name id 0x{id:08x} at offset {offset}")]
    UnknownNameId { id: u32, offset: usize },

    #[error("Malformed data at offset {offset}: {message}")]
    Format { offset: usize, message: String },

    #[error("Decompression size mismatch: expected {expected}, got {actual}")]
    DecompressionSize { expected: usize, actual: usize },

    #[error("Property {name:?} payload is {expected} bytes, new encoding is {actual} bytes")]
    SizeMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Failed to inflate compressed data: {0}")]
    Decompression(#[source] std::io::Error),

    #[error("Name {name:?} not found in save context{}", splicing(.blueprint))]
    NameNotFound {
        name: String,
        blueprint: Option<String>,
    },

    #[error("Name {0:?} maps to more than one id")]
    AmbiguousName(String),

    #[error("Object {0} already exists")]
    DuplicateUuid(Uuid),

    #[error("Object {0} not found")]
    NotFound(Uuid),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Classify this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Truncated { .. }
            | Error::InvalidMagic { .. }
            | Error::Mismatch { .. }
            | Error::UnknownValueType { .. }
            | Error::UnknownNameId { .. }
            | Error::Format { .. }
            | Error::DecompressionSize { .. }
            | Error::SizeMismatch { .. } => ErrorCategory::Format,
            Error::Decompression(_) => ErrorCategory::Decompression,
            Error::NameNotFound { .. } | Error::AmbiguousName(_) | Error::DuplicateUuid(_) => {
                ErrorCategory::Identity
            }
            Error::NotFound(_) => ErrorCategory::NotFound,
            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Byte offset the error occurred at (if available)
    pub fn offset(&self) -> Option<usize> {
        match *self {
            Error::Truncated { offset, .. }
            | Error::Mismatch { offset, .. }
            | Error::UnknownValueType { offset, .. }
            | Error::UnknownNameId { offset, .. }
            | Error::Format { offset, .. } => Some(offset),
            _ => None,
        }
    }

    /// Whether the caller can reasonably continue after this error
    pub fn is_recoverable(&self) -> bool {
        self.category() == ErrorCategory::NotFound
    }

    pub(crate) fn format(offset: usize, message: impl Into<String>) -> Self {
        Error::Format {
            offset,
            message: message.into(),
        }
    }
}

fn splicing(blueprint: &Option<String>) -> String {
    blueprint
        .as_ref()
        .map(|b| format!(" (while splicing {b})"))
        .unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, Error>;

/// The all-zero UUID terminating actor-transform tables
pub const NULL_UUID: Uuid = Uuid::nil();
