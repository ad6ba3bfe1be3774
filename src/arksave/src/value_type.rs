//! Registry of property value types.
//!
//! A closed mapping between the type names found in property tags and the
//! codec strategy used for their payloads. There is no fallback for unknown
//! names: skipping a value of unknown layout would desynchronize every read
//! that follows.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ValueType {
    Int8,
    Int16,
    Int,
    Int64,
    UInt16,
    UInt32,
    UInt64,
    Float,
    Double,
    Bool,
    Byte,
    Enum,
    Str,
    Name,
    Object,
    SoftObject,
    Struct,
    Array,
    Set,
    Map,
}

impl ValueType {
    pub const ALL: [ValueType; 20] = [
        ValueType::Int8,
        ValueType::Int16,
        ValueType::Int,
        ValueType::Int64,
        ValueType::UInt16,
        ValueType::UInt32,
        ValueType::UInt64,
        ValueType::Float,
        ValueType::Double,
        ValueType::Bool,
        ValueType::Byte,
        ValueType::Enum,
        ValueType::Str,
        ValueType::Name,
        ValueType::Object,
        ValueType::SoftObject,
        ValueType::Struct,
        ValueType::Array,
        ValueType::Set,
        ValueType::Map,
    ];

    /// Look up a type by its canonical name
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "Int8Property" => ValueType::Int8,
            "Int16Property" => ValueType::Int16,
            "IntProperty" => ValueType::Int,
            "Int64Property" => ValueType::Int64,
            "UInt16Property" => ValueType::UInt16,
            "UInt32Property" => ValueType::UInt32,
            "UInt64Property" => ValueType::UInt64,
            "FloatProperty" => ValueType::Float,
            "DoubleProperty" => ValueType::Double,
            "BoolProperty" => ValueType::Bool,
            "ByteProperty" => ValueType::Byte,
            "EnumProperty" => ValueType::Enum,
            "StrProperty" => ValueType::Str,
            "NameProperty" => ValueType::Name,
            "ObjectProperty" => ValueType::Object,
            "SoftObjectProperty" => ValueType::SoftObject,
            "StructProperty" => ValueType::Struct,
            "ArrayProperty" => ValueType::Array,
            "SetProperty" => ValueType::Set,
            "MapProperty" => ValueType::Map,
            _ => return None,
        })
    }

    /// Canonical type name as written in property tags
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Int8 => "Int8Property",
            ValueType::Int16 => "Int16Property",
            ValueType::Int => "IntProperty",
            ValueType::Int64 => "Int64Property",
            ValueType::UInt16 => "UInt16Property",
            ValueType::UInt32 => "UInt32Property",
            ValueType::UInt64 => "UInt64Property",
            ValueType::Float => "FloatProperty",
            ValueType::Double => "DoubleProperty",
            ValueType::Bool => "BoolProperty",
            ValueType::Byte => "ByteProperty",
            ValueType::Enum => "EnumProperty",
            ValueType::Str => "StrProperty",
            ValueType::Name => "NameProperty",
            ValueType::Object => "ObjectProperty",
            ValueType::SoftObject => "SoftObjectProperty",
            ValueType::Struct => "StructProperty",
            ValueType::Array => "ArrayProperty",
            ValueType::Set => "SetProperty",
            ValueType::Map => "MapProperty",
        }
    }

    /// Payload width for fixed-size scalars
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            ValueType::Int8 => Some(1),
            ValueType::Int16 | ValueType::UInt16 => Some(2),
            ValueType::Int | ValueType::UInt32 | ValueType::Float => Some(4),
            ValueType::Int64 | ValueType::UInt64 | ValueType::Double => Some(8),
            ValueType::Bool => Some(0),
            _ => None,
        }
    }

    /// Containers whose payload is a counted run of elements
    pub fn is_container(self) -> bool {
        matches!(self, ValueType::Array | ValueType::Set | ValueType::Map)
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for value_type in ValueType::ALL {
            assert_eq!(ValueType::from_name(value_type.name()), Some(value_type));
        }
    }

    #[test]
    fn test_unknown_name() {
        assert_eq!(ValueType::from_name("TextProperty"), None);
        assert_eq!(ValueType::from_name("intproperty"), None);
        assert_eq!(ValueType::from_name(""), None);
    }

    #[test]
    fn test_fixed_sizes() {
        assert_eq!(ValueType::Bool.fixed_size(), Some(0));
        assert_eq!(ValueType::Double.fixed_size(), Some(8));
        assert_eq!(ValueType::Struct.fixed_size(), None);
        assert!(ValueType::Map.is_container());
        assert!(!ValueType::Str.is_container());
    }
}
