//! Decoded view of an object blob.
//!
//! Layout of a stored object:
//!
//! ```text
//! blueprint   wire name
//! u32         0
//! u32         name count
//! names       wire names (the first is the display name)
//! i32         section index (-1 = none)
//! properties  property stream
//! ```
//!
//! A [`GameObject`] is derived from those bytes on demand and is never the
//! authoritative copy; edits go through the byte buffer.

use serde::Serialize;
use uuid::Uuid;

use crate::cursor::ByteCursor;
use crate::names::{encode_name, NameRef, SaveContext};
use crate::property::{read_properties, Property, PropertyWriter, Value};
use crate::Result;

/// Structural classification of an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObjectKind {
    Creature { tamed: bool, baby: bool },
    Cryopod,
    Structure { has_inventory: bool },
    Inventory,
    Item,
    Other,
}

impl ObjectKind {
    pub fn is_creature(&self) -> bool {
        matches!(self, ObjectKind::Creature { .. })
    }
}

/// Position of the display name's instance number within a blob
pub(crate) fn display_number_offset(
    cursor: &mut ByteCursor,
    context: &SaveContext,
) -> Result<usize> {
    cursor.set_position(0)?;
    cursor.read_name_ref(context)?;
    cursor.validate_u32(0)?;
    let count = cursor.read_u32()?;
    if count == 0 {
        return Err(crate::Error::format(
            cursor.position() - 4,
            "object has no names",
        ));
    }
    if context.has_name_table() {
        cursor.read_u32()?;
    } else {
        cursor.read_string()?;
    }
    Ok(cursor.position())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameObject {
    pub uuid: Uuid,
    pub blueprint: String,
    pub names: Vec<NameRef>,
    #[serde(skip)]
    pub section_index: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub properties: Vec<Property>,
}

impl GameObject {
    /// Decode an object blob from the start of `cursor`
    pub fn read(uuid: Uuid, cursor: &mut ByteCursor, context: &SaveContext) -> Result<Self> {
        cursor.set_position(0)?;
        let blueprint = cursor.read_name(context)?;
        cursor.validate_u32(0)?;

        let count = cursor.read_u32()? as usize;
        let mut names = Vec::with_capacity(count.min(cursor.remaining()));
        for _ in 0..count {
            names.push(cursor.read_name_ref(context)?);
        }

        let section_index = cursor.read_i32()?;
        let section = context.section(section_index).map(str::to_string);
        let properties = read_properties(cursor, context)?;

        Ok(Self {
            uuid,
            blueprint,
            names,
            section_index,
            section,
            properties,
        })
    }

    pub fn from_bytes(uuid: Uuid, data: &[u8], context: &SaveContext) -> Result<Self> {
        Self::read(uuid, &mut ByteCursor::from_slice(data), context)
    }

    /// Decode just the blueprint name
    pub fn peek_blueprint(data: &[u8], context: &SaveContext) -> Result<String> {
        ByteCursor::from_slice(data).read_name(context)
    }

    /// Decode just the display name, without the property stream
    pub fn peek_display_name(data: &[u8], context: &SaveContext) -> Result<Option<NameRef>> {
        let mut cursor = ByteCursor::from_slice(data);
        cursor.read_name_ref(context)?;
        cursor.validate_u32(0)?;
        if cursor.read_u32()? == 0 {
            return Ok(None);
        }
        cursor.read_name_ref(context).map(Some)
    }

    /// Encode back into a blob
    pub fn to_bytes(&self, context: &SaveContext) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        encode_name(&mut out, context, &NameRef::new(self.blueprint.as_str()))?;
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&(self.names.len() as u32).to_le_bytes());
        for name in &self.names {
            encode_name(&mut out, context, name)?;
        }
        out.extend_from_slice(&self.section_index.to_le_bytes());

        let mut writer = PropertyWriter::new(context);
        for property in &self.properties {
            writer.existing(property)?;
        }
        out.extend(writer.finish()?);
        Ok(out)
    }

    /// Display name with its copy suffix, e.g. `Dodo_Character_BP_C_12`
    pub fn display_name(&self) -> Option<String> {
        self.names.first().map(NameRef::display)
    }

    /// Instance number of the display name (0 = unnumbered)
    pub fn name_number(&self) -> u32 {
        self.names.first().map_or(0, |name| name.number)
    }

    /// First record with this name
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Record for one slot of a static array
    pub fn property_at(&self, name: &str, index: u32) -> Option<&Property> {
        self.properties
            .iter()
            .find(|p| p.name == name && p.index == index)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.property(name).is_some()
    }

    /// Value of the named property, or `default` when absent
    pub fn property_value<'a>(&'a self, name: &str, default: &'a Value) -> &'a Value {
        self.property(name).map_or(default, |p| &p.value)
    }

    pub fn get_bool(&self, name: &str) -> bool {
        self.property(name)
            .and_then(|p| p.value.as_bool())
            .unwrap_or(false)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.property(name).and_then(|p| p.value.as_i64())
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.property(name).and_then(|p| p.value.as_f64())
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.property(name).and_then(|p| p.value.as_str())
    }

    /// UUID held by an object reference property
    pub fn get_uuid(&self, name: &str) -> Option<Uuid> {
        self.property(name).and_then(|p| p.value.as_uuid())
    }

    /// Inventory object owned by this object, if any
    pub fn inventory(&self) -> Option<Uuid> {
        self.get_uuid("MyInventoryComponent")
    }

    pub fn kind(&self) -> ObjectKind {
        let bp = self.blueprint.as_str();
        if bp.contains("Dinos/") && bp.contains("_Character_") {
            ObjectKind::Creature {
                tamed: self.has_property("TamedTimeStamp"),
                baby: self.get_bool("bIsBaby"),
            }
        } else if bp.contains("PrimalItem_WeaponEmptyCryopod_C") {
            ObjectKind::Cryopod
        } else if bp.contains("PrimalItem") {
            ObjectKind::Item
        } else if bp.contains("PrimalInventory") || bp.contains("InventoryComponent") {
            ObjectKind::Inventory
        } else if bp.contains("/Structures/") {
            ObjectKind::Structure {
                has_inventory: self.inventory().is_some(),
            }
        } else {
            ObjectKind::Other
        }
    }
}
