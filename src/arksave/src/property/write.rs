//! Property stream encoding and in-place patching.

use super::{
    ObjectRef, Property, StructValue, TypeTree, Value, FLAG_ARRAY_INDEX, FLAG_BOOL_TRUE,
    FLAG_EXTENSIONS, FLAG_NATIVE, FLAG_PROPERTY_GUID,
};
use crate::cursor::{encode_string, ByteCursor};
use crate::names::{encode_name, NameRef, SaveContext, NONE_NAME};
use crate::value_type::ValueType;
use crate::{Error, Result};

/// Builds a property stream record by record
///
/// ```
/// use arksave::{PropertyWriter, SaveContext, TypeTree, Value, ValueType};
///
/// let context = SaveContext::new();
/// let mut writer = PropertyWriter::new(&context);
/// writer.property("Health", &TypeTree::of(ValueType::Float), &Value::Float(100.0))?;
/// let bytes = writer.finish()?;
/// # Ok::<(), arksave::Error>(())
/// ```
pub struct PropertyWriter<'a> {
    context: &'a SaveContext,
    out: Vec<u8>,
}

impl<'a> PropertyWriter<'a> {
    pub fn new(context: &'a SaveContext) -> Self {
        Self {
            context,
            out: Vec::new(),
        }
    }

    /// Append a record with array index 0
    pub fn property(&mut self, name: &str, tree: &TypeTree, value: &Value) -> Result<&mut Self> {
        self.indexed_property(name, 0, tree, value)
    }

    /// Append a record for one slot of a static array
    pub fn indexed_property(
        &mut self,
        name: &str,
        index: u32,
        tree: &TypeTree,
        value: &Value,
    ) -> Result<&mut Self> {
        let tag = Tag {
            index,
            guid: None,
            decoded_flags: None,
        };
        encode_record(&mut self.out, self.context, name, &tag, tree, value)?;
        Ok(self)
    }

    /// Re-encode a decoded record, keeping its index, GUID and tag flags
    pub fn existing(&mut self, property: &Property) -> Result<&mut Self> {
        encode_existing(&mut self.out, self.context, property)?;
        Ok(self)
    }

    /// Append the `None` terminator and return the stream
    pub fn finish(mut self) -> Result<Vec<u8>> {
        encode_name(&mut self.out, self.context, &NameRef::new(NONE_NAME))?;
        Ok(self.out)
    }
}

/// Tag fields that do not follow from the value
struct Tag {
    index: u32,
    guid: Option<uuid::Uuid>,
    /// Flags of a decoded record; its native and extension bits are kept
    decoded_flags: Option<u8>,
}

const KEPT_FLAGS: u8 = FLAG_NATIVE | FLAG_EXTENSIONS;

fn encode_existing(out: &mut Vec<u8>, context: &SaveContext, property: &Property) -> Result<()> {
    let tag = Tag {
        index: property.index,
        guid: property.guid,
        decoded_flags: Some(property.flags),
    };
    encode_record(
        out,
        context,
        &property.name,
        &tag,
        &property.type_tree,
        &property.value,
    )
}

fn encode_record(
    out: &mut Vec<u8>,
    context: &SaveContext,
    name: &str,
    tag: &Tag,
    tree: &TypeTree,
    value: &Value,
) -> Result<()> {
    let value_type = tree.value_type().ok_or_else(|| Error::UnknownValueType {
        name: tree.name.clone(),
        offset: out.len(),
    })?;

    let mut payload = Vec::new();
    let mut flags = 0u8;
    match (value_type, value) {
        (ValueType::Bool, Value::Bool(b)) => {
            if *b {
                flags |= FLAG_BOOL_TRUE;
            }
        }
        _ => encode_value(&mut payload, context, tree, value)?,
    }
    match tag.decoded_flags {
        Some(decoded) => flags |= decoded & KEPT_FLAGS,
        None => {
            if value_type == ValueType::Struct
                && tree.struct_name().is_some_and(StructValue::is_native)
            {
                flags |= FLAG_NATIVE;
            }
        }
    }
    if tag.index != 0 {
        flags |= FLAG_ARRAY_INDEX;
    }
    if tag.guid.is_some() {
        flags |= FLAG_PROPERTY_GUID;
    }

    encode_name(out, context, &NameRef::new(name))?;
    encode_type_tree(out, context, tree)?;
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.push(flags);
    if tag.index != 0 {
        out.extend_from_slice(&tag.index.to_le_bytes());
    }
    if let Some(guid) = tag.guid {
        out.extend_from_slice(guid.as_bytes());
    }
    if flags & FLAG_EXTENSIONS != 0 {
        out.push(0);
    }
    out.extend_from_slice(&payload);
    Ok(())
}

fn encode_type_tree(out: &mut Vec<u8>, context: &SaveContext, tree: &TypeTree) -> Result<()> {
    encode_name(out, context, &NameRef::new(tree.name.as_str()))?;
    out.extend_from_slice(&(tree.params.len() as u32).to_le_bytes());
    for param in &tree.params {
        encode_type_tree(out, context, param)?;
    }
    Ok(())
}

fn mismatch(out: &[u8], tree: &TypeTree, value: &Value) -> Error {
    Error::format(out.len(), format!("cannot encode {value:?} as {tree}"))
}

/// Append the payload encoding of `value` under `tree`
///
/// Bools encode as a single byte here; inside a record their value lives in
/// the tag flags instead.
pub fn encode_value(
    out: &mut Vec<u8>,
    context: &SaveContext,
    tree: &TypeTree,
    value: &Value,
) -> Result<()> {
    let value_type = tree.value_type().ok_or_else(|| Error::UnknownValueType {
        name: tree.name.clone(),
        offset: out.len(),
    })?;

    match (value_type, value) {
        (ValueType::Int8, Value::Int8(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (ValueType::Int16, Value::Int16(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (ValueType::Int, Value::Int(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (ValueType::Int64, Value::Int64(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (ValueType::UInt16, Value::UInt16(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (ValueType::UInt32, Value::UInt32(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (ValueType::UInt64, Value::UInt64(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (ValueType::Float, Value::Float(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (ValueType::Double, Value::Double(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (ValueType::Bool, Value::Bool(v)) => out.push(u8::from(*v)),
        (ValueType::Byte, Value::Byte(v)) if tree.enum_name().is_none() => out.push(*v),
        (ValueType::Byte, Value::Enum(name)) if tree.enum_name().is_some() => {
            encode_name(out, context, name)?
        }
        (ValueType::Enum, Value::Enum(name)) | (ValueType::Name, Value::Name(name)) => {
            encode_name(out, context, name)?
        }
        (ValueType::Str, Value::Str(s)) => encode_string(out, s),
        (ValueType::Object, Value::Object(reference)) => match reference {
            ObjectRef::Id(id) => {
                out.extend_from_slice(&ObjectRef::KIND_ID.to_le_bytes());
                out.extend_from_slice(id.as_bytes());
            }
            ObjectRef::Path(path) => {
                out.extend_from_slice(&ObjectRef::KIND_PATH.to_le_bytes());
                encode_name(out, context, path)?;
            }
        },
        (ValueType::SoftObject, Value::SoftObject { path, sub_path }) => {
            encode_name(out, context, path)?;
            encode_string(out, sub_path);
        }
        (ValueType::Struct, Value::Struct(s)) => encode_struct(out, context, tree, s)?,
        (ValueType::Array, Value::Array(items)) => {
            let inner = tree.param(0).ok_or_else(|| mismatch(out, tree, value))?;
            encode_elements(out, context, inner, items)?;
        }
        (ValueType::Set, Value::Set(items)) => {
            let inner = tree.param(0).ok_or_else(|| mismatch(out, tree, value))?;
            out.extend_from_slice(&0u32.to_le_bytes());
            encode_elements(out, context, inner, items)?;
        }
        (ValueType::Map, Value::Map(pairs)) => {
            let (Some(key), Some(item)) = (tree.param(0), tree.param(1)) else {
                return Err(mismatch(out, tree, value));
            };
            out.extend_from_slice(&0u32.to_le_bytes());
            out.extend_from_slice(&(pairs.len() as u32).to_le_bytes());
            for (k, v) in pairs {
                encode_value(out, context, key, k)?;
                encode_value(out, context, item, v)?;
            }
        }
        _ => return Err(mismatch(out, tree, value)),
    }
    Ok(())
}

fn encode_elements(
    out: &mut Vec<u8>,
    context: &SaveContext,
    inner: &TypeTree,
    items: &[Value],
) -> Result<()> {
    out.extend_from_slice(&(items.len() as u32).to_le_bytes());
    for item in items {
        encode_value(out, context, inner, item)?;
    }
    Ok(())
}

fn encode_struct(
    out: &mut Vec<u8>,
    context: &SaveContext,
    tree: &TypeTree,
    value: &StructValue,
) -> Result<()> {
    let name = tree.struct_name().unwrap_or_default();
    match (name, value) {
        ("Vector", StructValue::Vector(v)) => v.encode(out),
        ("Rotator", StructValue::Rotator(r)) => r.encode(out),
        ("Vector2D", StructValue::Vector2D { x, y }) => {
            for c in [x, y] {
                out.extend_from_slice(&c.to_le_bytes());
            }
        }
        ("Quat", StructValue::Quat { x, y, z, w }) => {
            for c in [x, y, z, w] {
                out.extend_from_slice(&c.to_le_bytes());
            }
        }
        ("LinearColor", StructValue::LinearColor { r, g, b, a }) => {
            for c in [r, g, b, a] {
                out.extend_from_slice(&c.to_le_bytes());
            }
        }
        ("Color", StructValue::Color { b, g, r, a }) => {
            out.extend_from_slice(&[*b, *g, *r, *a]);
        }
        ("Guid", StructValue::Guid(id)) => out.extend_from_slice(id.as_bytes()),
        (name, StructValue::Properties(props)) if !StructValue::is_native(name) => {
            for prop in props {
                encode_existing(out, context, prop)?;
            }
            encode_name(out, context, &NameRef::new(NONE_NAME))?;
        }
        _ => {
            return Err(Error::format(
                out.len(),
                format!("cannot encode {value:?} as struct {name}"),
            ))
        }
    }
    Ok(())
}

/// Overwrite a decoded property's value in place
///
/// Only same-length edits are applied here; a value whose encoding differs
/// in size from the stored payload fails with [`Error::SizeMismatch`] and
/// leaves the bytes untouched. Bools flip their tag flag. On success
/// `property` is updated to the new value.
pub fn patch_property(
    cursor: &mut ByteCursor,
    context: &SaveContext,
    property: &mut Property,
    value: Value,
) -> Result<()> {
    if property.value_type() == Some(ValueType::Bool) {
        let Value::Bool(b) = value else {
            return Err(mismatch(&[], &property.type_tree, &value));
        };
        let flags = if b {
            property.flags | FLAG_BOOL_TRUE
        } else {
            property.flags & !FLAG_BOOL_TRUE
        };
        cursor.replace_bytes(property.flags_offset, &[flags])?;
        property.flags = flags;
        property.value = value;
        return Ok(());
    }

    let mut payload = Vec::new();
    encode_value(&mut payload, context, &property.type_tree, &value)?;
    if payload.len() != property.size as usize {
        return Err(Error::SizeMismatch {
            name: property.name.clone(),
            expected: property.size as usize,
            actual: payload.len(),
        });
    }

    cursor.replace_bytes(property.value_offset, &payload)?;
    tracing::debug!(
        name = %property.name,
        offset = property.value_offset,
        size = property.size,
        "Patched property"
    );
    property.value = value;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{read_properties, read_property};
    use crate::transform::Vector;

    fn context() -> SaveContext {
        SaveContext::with_names([
            "None",
            "TamedName",
            "StrProperty",
            "bIsFemale",
            "BoolProperty",
            "Level",
            "IntProperty",
            "StructProperty",
            "Vector",
            "/Script/CoreUObject",
            "Location",
        ])
    }

    fn stream(ctx: &SaveContext) -> ByteCursor {
        let mut writer = PropertyWriter::new(ctx);
        writer
            .property("TamedName", &TypeTree::of(ValueType::Str), &Value::Str("Rex".into()))
            .unwrap()
            .property("bIsFemale", &TypeTree::of(ValueType::Bool), &Value::Bool(false))
            .unwrap()
            .indexed_property("Level", 2, &TypeTree::of(ValueType::Int), &Value::Int(10))
            .unwrap();
        ByteCursor::new(writer.finish().unwrap())
    }

    #[test]
    fn test_patch_same_length_value() {
        let ctx = context();
        let mut cursor = stream(&ctx);
        let mut props = read_properties(&mut cursor, &ctx).unwrap();
        let before = cursor.size();

        patch_property(&mut cursor, &ctx, &mut props[0], Value::Str("Max".into())).unwrap();
        patch_property(&mut cursor, &ctx, &mut props[2], Value::Int(150)).unwrap();
        assert_eq!(cursor.size(), before);

        cursor.set_position(0).unwrap();
        let reread = read_properties(&mut cursor, &ctx).unwrap();
        assert_eq!(reread[0].value, Value::Str("Max".into()));
        assert_eq!(reread[2].value, Value::Int(150));
        assert_eq!(reread[2].index, 2);
        assert_eq!(reread, props);
    }

    #[test]
    fn test_patch_size_mismatch_leaves_bytes() {
        let ctx = context();
        let mut cursor = stream(&ctx);
        let mut props = read_properties(&mut cursor, &ctx).unwrap();
        let original = cursor.as_bytes().to_vec();

        let err = patch_property(&mut cursor, &ctx, &mut props[0], Value::Str("Rexy".into()))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::SizeMismatch { expected: 8, actual: 9, .. }
        ));
        assert_eq!(cursor.as_bytes(), original.as_slice());
        assert_eq!(props[0].value, Value::Str("Rex".into()));
    }

    #[test]
    fn test_patch_bool_flips_flag() {
        let ctx = context();
        let mut cursor = stream(&ctx);
        let mut props = read_properties(&mut cursor, &ctx).unwrap();

        patch_property(&mut cursor, &ctx, &mut props[1], Value::Bool(true)).unwrap();

        cursor.set_position(props[1].offset).unwrap();
        let reread = read_property(&mut cursor, &ctx).unwrap().unwrap();
        assert_eq!(reread.value, Value::Bool(true));
    }

    #[test]
    fn test_patch_type_mismatch() {
        let ctx = context();
        let mut cursor = stream(&ctx);
        let mut props = read_properties(&mut cursor, &ctx).unwrap();
        assert!(matches!(
            patch_property(&mut cursor, &ctx, &mut props[2], Value::Float(1.0)),
            Err(Error::Format { .. })
        ));
    }

    #[test]
    fn test_native_struct_flag() {
        let ctx = context();
        let mut writer = PropertyWriter::new(&ctx);
        writer
            .property(
                "Location",
                &TypeTree::structure("Vector"),
                &Value::Struct(StructValue::Vector(Vector::new(1.0, 2.0, 3.0))),
            )
            .unwrap();
        let mut cursor = ByteCursor::new(writer.finish().unwrap());
        let props = read_properties(&mut cursor, &ctx).unwrap();
        assert_ne!(props[0].flags & FLAG_NATIVE, 0);
    }

    #[test]
    fn test_writing_unregistered_name_fails() {
        let ctx = context();
        let mut writer = PropertyWriter::new(&ctx);
        let err = writer
            .property("Missing", &TypeTree::of(ValueType::Int), &Value::Int(1))
            .err()
            .unwrap();
        assert!(matches!(err, Error::NameNotFound { .. }));
    }

    #[test]
    fn test_existing_reencodes_identically() {
        let ctx = context();
        let mut cursor = stream(&ctx);
        let props = read_properties(&mut cursor, &ctx).unwrap();

        let mut writer = PropertyWriter::new(&ctx);
        for prop in &props {
            writer.existing(prop).unwrap();
        }
        assert_eq!(writer.finish().unwrap(), cursor.into_inner());
    }

    #[test]
    fn test_existing_keeps_extension_byte() {
        let ctx = context();
        let mut cursor = ByteCursor::default();
        cursor.write_name(&ctx, &NameRef::new("Level")).unwrap();
        cursor.write_name(&ctx, &NameRef::new("IntProperty")).unwrap();
        cursor.write_u32(0);
        cursor.write_u32(4);
        cursor.write_u8(FLAG_EXTENSIONS);
        cursor.write_u8(0);
        cursor.write_i32(10);
        cursor.write_name(&ctx, &NameRef::new(NONE_NAME)).unwrap();
        cursor.set_position(0).unwrap();

        let props = read_properties(&mut cursor, &ctx).unwrap();
        assert_eq!(props[0].flags, FLAG_EXTENSIONS);
        assert_eq!(props[0].value, Value::Int(10));

        let mut writer = PropertyWriter::new(&ctx);
        writer.existing(&props[0]).unwrap();
        assert_eq!(writer.finish().unwrap(), cursor.into_inner());
    }
}
