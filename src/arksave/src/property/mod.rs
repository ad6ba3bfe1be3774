//! Typed property streams.
//!
//! A property stream is a run of self-describing records terminated by the
//! name `None`:
//!
//! ```text
//! name     wire name
//! type     type tree: wire name, u32 param count, params...
//! size     u32 payload length
//! flags    u8 (see the `FLAG_*` constants)
//! [index]  u32 when FLAG_ARRAY_INDEX
//! [guid]   16 bytes when FLAG_PROPERTY_GUID
//! [ext]    u8 (always 0) when FLAG_EXTENSIONS
//! payload  size bytes
//! ```
//!
//! Records are decoded in place; each [`Property`] remembers where its tag,
//! flags and payload live so a value can later be patched without
//! re-serializing the object.

mod read;
mod write;

pub use read::{read_properties, read_property, read_type_tree};
pub use write::{encode_value, patch_property, PropertyWriter};

use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::names::NameRef;
use crate::transform::{Rotator, Vector};
use crate::value_type::ValueType;

/// Tag carries an explicit static-array index
pub const FLAG_ARRAY_INDEX: u8 = 0x01;
/// Tag carries a property GUID
pub const FLAG_PROPERTY_GUID: u8 = 0x02;
/// Tag carries an extension byte
pub const FLAG_EXTENSIONS: u8 = 0x04;
/// Payload uses a native (non-tagged) layout
pub const FLAG_NATIVE: u8 = 0x08;
/// Value of a `BoolProperty`
pub const FLAG_BOOL_TRUE: u8 = 0x10;

/// Module path written as the parameter of native struct type names
pub const CORE_UOBJECT: &str = "/Script/CoreUObject";

/// Nested property type, e.g. `ArrayProperty(StructProperty(Vector(/Script/CoreUObject)))`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeTree {
    pub name: String,
    pub params: Vec<TypeTree>,
}

impl TypeTree {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    pub fn of(value_type: ValueType) -> Self {
        Self::new(value_type.name())
    }

    pub fn with_param(mut self, param: TypeTree) -> Self {
        self.params.push(param);
        self
    }

    /// `StructProperty(<name>(/Script/CoreUObject))`
    pub fn structure(name: &str) -> Self {
        let inner = TypeTree::new(name).with_param(TypeTree::new(CORE_UOBJECT));
        Self::of(ValueType::Struct).with_param(inner)
    }

    pub fn array(inner: TypeTree) -> Self {
        Self::of(ValueType::Array).with_param(inner)
    }

    pub fn value_type(&self) -> Option<ValueType> {
        ValueType::from_name(&self.name)
    }

    pub fn param(&self, index: usize) -> Option<&TypeTree> {
        self.params.get(index)
    }

    /// Struct name for `StructProperty` trees
    pub fn struct_name(&self) -> Option<&str> {
        self.param(0).map(|p| p.name.as_str())
    }

    /// Enum name for enum-backed `ByteProperty` trees
    pub fn enum_name(&self) -> Option<&str> {
        self.param(0)
            .map(|p| p.name.as_str())
            .filter(|name| *name != crate::names::NONE_NAME)
    }
}

impl std::fmt::Display for TypeTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)?;
        if !self.params.is_empty() {
            f.write_str("(")?;
            for (i, param) in self.params.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{param}")?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}

impl Serialize for TypeTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl Serialize for NameRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.display())
    }
}

/// Reference to another object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ObjectRef {
    /// Another object in the same save, by UUID
    Id(Uuid),
    /// An asset or class path
    Path(NameRef),
}

impl ObjectRef {
    pub const KIND_ID: u16 = 0;
    pub const KIND_PATH: u16 = 1;
}

/// Decoded struct payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StructValue {
    Vector(Vector),
    Vector2D { x: f64, y: f64 },
    Rotator(Rotator),
    Quat { x: f64, y: f64, z: f64, w: f64 },
    LinearColor { r: f32, g: f32, b: f32, a: f32 },
    Color { b: u8, g: u8, r: u8, a: u8 },
    Guid(Uuid),
    /// Any other struct: a nested property stream
    Properties(Vec<Property>),
}

impl StructValue {
    /// Property of a nested stream by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self {
            StructValue::Properties(props) => {
                props.iter().find(|p| p.name == name).map(|p| &p.value)
            }
            _ => None,
        }
    }

    /// Whether `struct_name` is encoded natively rather than as a property stream
    pub fn is_native(struct_name: &str) -> bool {
        matches!(
            struct_name,
            "Vector" | "Vector2D" | "Rotator" | "Quat" | "LinearColor" | "Color" | "Guid"
        )
    }
}

/// Decoded property value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int(i32),
    Int64(i64),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    Double(f64),
    Byte(u8),
    Enum(NameRef),
    Str(String),
    Name(NameRef),
    Object(ObjectRef),
    SoftObject { path: NameRef, sub_path: String },
    Struct(StructValue),
    Array(Vec<Value>),
    Set(Vec<Value>),
    Map(Vec<(Value, Value)>),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Any integer value widened to `i64`
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int8(v) => Some(v.into()),
            Value::Int16(v) => Some(v.into()),
            Value::Int(v) => Some(v.into()),
            Value::Int64(v) => Some(v),
            Value::UInt16(v) => Some(v.into()),
            Value::UInt32(v) => Some(v.into()),
            Value::UInt64(v) => i64::try_from(v).ok(),
            Value::Byte(v) => Some(v.into()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Float(v) => Some(v.into()),
            Value::Double(v) => Some(v),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    /// String payload, or the base of a name/enum value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            Value::Name(name) | Value::Enum(name) => Some(&name.base),
            _ => None,
        }
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Value::Object(ObjectRef::Id(id)) => Some(*id),
            Value::Struct(StructValue::Guid(id)) => Some(*id),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructValue> {
        match self {
            Value::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) | Value::Set(items) => Some(items),
            _ => None,
        }
    }
}

/// One decoded property record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Property {
    pub name: String,
    #[serde(rename = "type")]
    pub type_tree: TypeTree,
    #[serde(skip_serializing_if = "is_zero")]
    pub index: u32,
    #[serde(skip)]
    pub flags: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guid: Option<Uuid>,
    pub value: Value,
    /// Offset of the record's name
    #[serde(skip)]
    pub offset: usize,
    /// Offset of the flags byte
    #[serde(skip)]
    pub flags_offset: usize,
    /// Offset of the payload
    #[serde(skip)]
    pub value_offset: usize,
    /// Payload length declared by the tag
    #[serde(skip)]
    pub size: u32,
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

impl Property {
    pub fn value_type(&self) -> Option<ValueType> {
        self.type_tree.value_type()
    }

    /// Offset one past the end of the payload
    pub fn end_offset(&self) -> usize {
        self.value_offset + self.size as usize
    }
}
