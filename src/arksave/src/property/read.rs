//! Property stream decoding.

use super::{
    ObjectRef, Property, StructValue, TypeTree, Value, FLAG_ARRAY_INDEX, FLAG_BOOL_TRUE,
    FLAG_EXTENSIONS, FLAG_PROPERTY_GUID,
};
use crate::cursor::ByteCursor;
use crate::names::{SaveContext, NONE_NAME};
use crate::transform::{Rotator, Vector};
use crate::value_type::ValueType;
use crate::{Error, Result};

/// Type trees deeper than this are treated as a desynchronized read
const MAX_TYPE_DEPTH: usize = 8;
const MAX_TYPE_PARAMS: u32 = 4;
/// Property streams nested inside structs deeper than this are rejected
const MAX_STRUCT_DEPTH: usize = 32;

/// Read a nested type tree
pub fn read_type_tree(cursor: &mut ByteCursor, context: &SaveContext) -> Result<TypeTree> {
    read_type_tree_at(cursor, context, 0)
}

fn read_type_tree_at(
    cursor: &mut ByteCursor,
    context: &SaveContext,
    depth: usize,
) -> Result<TypeTree> {
    let offset = cursor.position();
    if depth > MAX_TYPE_DEPTH {
        return Err(Error::format(offset, "type tree nested too deeply"));
    }

    let name = cursor.read_name(context)?;
    let count_offset = cursor.position();
    let count = cursor.read_u32()?;
    if count > MAX_TYPE_PARAMS {
        return Err(Error::format(
            count_offset,
            format!("type {name} declares {count} parameters"),
        ));
    }

    let mut tree = TypeTree::new(name);
    for _ in 0..count {
        tree.params.push(read_type_tree_at(cursor, context, depth + 1)?);
    }
    Ok(tree)
}

/// Read one property record, or `None` at the stream terminator
///
/// The cursor ends exactly at the end of the record's payload; a payload
/// decode that consumes a different number of bytes than the tag declares
/// is a format error.
pub fn read_property(
    cursor: &mut ByteCursor,
    context: &SaveContext,
) -> Result<Option<Property>> {
    read_property_at(cursor, context, 0)
}

fn read_property_at(
    cursor: &mut ByteCursor,
    context: &SaveContext,
    depth: usize,
) -> Result<Option<Property>> {
    let offset = cursor.position();
    let name = cursor.read_name(context)?;
    if name == NONE_NAME {
        return Ok(None);
    }

    let type_offset = cursor.position();
    let type_tree = read_type_tree(cursor, context)?;
    let value_type = type_tree.value_type().ok_or_else(|| Error::UnknownValueType {
        name: type_tree.name.clone(),
        offset: type_offset,
    })?;

    let size = cursor.read_u32()?;
    let flags_offset = cursor.position();
    let flags = cursor.read_u8()?;
    let index = if flags & FLAG_ARRAY_INDEX != 0 {
        cursor.read_u32()?
    } else {
        0
    };
    let guid = if flags & FLAG_PROPERTY_GUID != 0 {
        Some(cursor.read_uuid()?)
    } else {
        None
    };
    if flags & FLAG_EXTENSIONS != 0 {
        cursor.validate_u8(0)?;
    }

    let value_offset = cursor.position();
    if cursor.remaining() < size as usize {
        return Err(Error::Truncated {
            offset: value_offset,
            needed: size as usize,
            available: cursor.remaining(),
        });
    }

    let value = match value_type {
        ValueType::Bool => Value::Bool(flags & FLAG_BOOL_TRUE != 0),
        _ => read_value(cursor, context, &type_tree, value_type, depth)?,
    };

    let end = value_offset + size as usize;
    if cursor.position() != end {
        return Err(Error::format(
            value_offset,
            format!(
                "{name} ({type_tree}) decoded {} bytes but its tag declares {size}",
                cursor.position() - value_offset
            ),
        ));
    }

    tracing::trace!(offset, name = %name, ty = %type_tree, size, "Read property");

    Ok(Some(Property {
        name,
        type_tree,
        index,
        flags,
        guid,
        value,
        offset,
        flags_offset,
        value_offset,
        size,
    }))
}

/// Read records until the `None` terminator
pub fn read_properties(cursor: &mut ByteCursor, context: &SaveContext) -> Result<Vec<Property>> {
    read_properties_at(cursor, context, 0)
}

fn read_properties_at(
    cursor: &mut ByteCursor,
    context: &SaveContext,
    depth: usize,
) -> Result<Vec<Property>> {
    let mut properties = Vec::new();
    while let Some(property) = read_property_at(cursor, context, depth)? {
        properties.push(property);
    }
    Ok(properties)
}

fn read_value(
    cursor: &mut ByteCursor,
    context: &SaveContext,
    tree: &TypeTree,
    value_type: ValueType,
    depth: usize,
) -> Result<Value> {
    Ok(match value_type {
        ValueType::Int8 => Value::Int8(cursor.read_i8()?),
        ValueType::Int16 => Value::Int16(cursor.read_i16()?),
        ValueType::Int => Value::Int(cursor.read_i32()?),
        ValueType::Int64 => Value::Int64(cursor.read_i64()?),
        ValueType::UInt16 => Value::UInt16(cursor.read_u16()?),
        ValueType::UInt32 => Value::UInt32(cursor.read_u32()?),
        ValueType::UInt64 => Value::UInt64(cursor.read_u64()?),
        ValueType::Float => Value::Float(cursor.read_f32()?),
        ValueType::Double => Value::Double(cursor.read_f64()?),
        // Outside a tag a bool has nowhere to live but a byte of its own
        ValueType::Bool => Value::Bool(cursor.read_u8()? != 0),
        ValueType::Byte => match tree.enum_name() {
            Some(_) => Value::Enum(cursor.read_name_ref(context)?),
            None => Value::Byte(cursor.read_u8()?),
        },
        ValueType::Enum => Value::Enum(cursor.read_name_ref(context)?),
        ValueType::Str => Value::Str(cursor.read_string()?),
        ValueType::Name => Value::Name(cursor.read_name_ref(context)?),
        ValueType::Object => Value::Object(read_object_ref(cursor, context)?),
        ValueType::SoftObject => Value::SoftObject {
            path: cursor.read_name_ref(context)?,
            sub_path: cursor.read_string()?,
        },
        ValueType::Struct => {
            let name = required_param(cursor, tree, 0)?.name.as_str();
            Value::Struct(read_struct(cursor, context, name, depth)?)
        }
        ValueType::Array => {
            let inner = required_param(cursor, tree, 0)?;
            Value::Array(read_elements(cursor, context, inner, depth)?)
        }
        ValueType::Set => {
            let inner = required_param(cursor, tree, 0)?;
            cursor.validate_u32(0)?;
            Value::Set(read_elements(cursor, context, inner, depth)?)
        }
        ValueType::Map => {
            let key = required_param(cursor, tree, 0)?;
            let value = required_param(cursor, tree, 1)?;
            cursor.validate_u32(0)?;
            let count = cursor.read_u32()? as usize;
            let mut pairs = Vec::with_capacity(count.min(cursor.remaining()));
            for _ in 0..count {
                let k = read_element(cursor, context, key, depth)?;
                let v = read_element(cursor, context, value, depth)?;
                pairs.push((k, v));
            }
            Value::Map(pairs)
        }
    })
}

fn required_param<'a>(
    cursor: &ByteCursor,
    tree: &'a TypeTree,
    index: usize,
) -> Result<&'a TypeTree> {
    tree.param(index).ok_or_else(|| {
        Error::format(
            cursor.position(),
            format!("{tree} is missing type parameter {index}"),
        )
    })
}

fn read_elements(
    cursor: &mut ByteCursor,
    context: &SaveContext,
    inner: &TypeTree,
    depth: usize,
) -> Result<Vec<Value>> {
    let count = cursor.read_u32()? as usize;
    let mut items = Vec::with_capacity(count.min(cursor.remaining()));
    for _ in 0..count {
        items.push(read_element(cursor, context, inner, depth)?);
    }
    Ok(items)
}

fn read_element(
    cursor: &mut ByteCursor,
    context: &SaveContext,
    tree: &TypeTree,
    depth: usize,
) -> Result<Value> {
    let value_type = tree.value_type().ok_or_else(|| Error::UnknownValueType {
        name: tree.name.clone(),
        offset: cursor.position(),
    })?;
    read_value(cursor, context, tree, value_type, depth)
}

fn read_object_ref(cursor: &mut ByteCursor, context: &SaveContext) -> Result<ObjectRef> {
    let offset = cursor.position();
    match cursor.read_u16()? {
        ObjectRef::KIND_ID => Ok(ObjectRef::Id(cursor.read_uuid()?)),
        ObjectRef::KIND_PATH => Ok(ObjectRef::Path(cursor.read_name_ref(context)?)),
        kind => Err(Error::format(
            offset,
            format!("unknown object reference kind {kind}"),
        )),
    }
}

fn read_struct(
    cursor: &mut ByteCursor,
    context: &SaveContext,
    name: &str,
    depth: usize,
) -> Result<StructValue> {
    Ok(match name {
        "Vector" => StructValue::Vector(Vector::read(cursor)?),
        "Rotator" => StructValue::Rotator(Rotator::read(cursor)?),
        "Vector2D" => StructValue::Vector2D {
            x: cursor.read_f64()?,
            y: cursor.read_f64()?,
        },
        "Quat" => StructValue::Quat {
            x: cursor.read_f64()?,
            y: cursor.read_f64()?,
            z: cursor.read_f64()?,
            w: cursor.read_f64()?,
        },
        "LinearColor" => StructValue::LinearColor {
            r: cursor.read_f32()?,
            g: cursor.read_f32()?,
            b: cursor.read_f32()?,
            a: cursor.read_f32()?,
        },
        "Color" => StructValue::Color {
            b: cursor.read_u8()?,
            g: cursor.read_u8()?,
            r: cursor.read_u8()?,
            a: cursor.read_u8()?,
        },
        "Guid" => StructValue::Guid(cursor.read_uuid()?),
        _ => {
            if depth >= MAX_STRUCT_DEPTH {
                return Err(Error::format(
                    cursor.position(),
                    format!("struct {name} nested too deeply"),
                ));
            }
            StructValue::Properties(read_properties_at(cursor, context, depth + 1)?)
        }
    })
}
