//! Name interning for save data.
//!
//! Property names, type names and object names are stored as 32-bit ids
//! into a per-save table. Ids with [`DYNAMIC_NAME_FLAG`] set come from the
//! table loaded with the save; lower ids resolve through a fixed constant
//! table shared by every compressed object blob.

use std::collections::HashMap;

use phf::phf_map;

use crate::cursor::ByteCursor;
use crate::{Error, Result};

/// 32-bit name identifier
pub type NameId = u32;

/// Bit marking an id as coming from the loaded name table
pub const DYNAMIC_NAME_FLAG: u32 = 0x1000_0000;

/// Name that terminates a property stream
pub const NONE_NAME: &str = "None";

/// Names compressed blobs may reference without a table entry
pub static CONSTANT_NAMES: phf::Map<u32, &'static str> = phf_map! {
    0u32 => "TribeName",
    1u32 => "StrProperty",
    2u32 => "bServerInitializedDino",
    3u32 => "BoolProperty",
    5u32 => "FloatProperty",
    6u32 => "ColorSetIndices",
    7u32 => "ByteProperty",
    8u32 => "None",
    9u32 => "ColorSetNames",
    10u32 => "NameProperty",
    11u32 => "TamingTeamID",
    12u32 => "UInt64Property",
    13u32 => "RequiredTameAffinity",
    14u32 => "TamingTeamID",
    15u32 => "IntProperty",
    19u32 => "StructProperty",
    23u32 => "DinoID1",
    24u32 => "UInt32Property",
    25u32 => "DinoID2",
    31u32 => "UploadedFromServerName",
    32u32 => "TamedOnServerName",
    36u32 => "TargetingTeam",
    38u32 => "bReplicateGlobalStatusValues",
    39u32 => "bAllowLevelUps",
    40u32 => "bServerFirstInitialized",
    41u32 => "ExperiencePoints",
    42u32 => "CurrentStatusValues",
    44u32 => "ArrayProperty",
    55u32 => "bIsFemale",
};

/// Session-wide name state for one open save
///
/// Passed by reference into every codec and editor call. Only mutated while
/// a name table is being loaded.
#[derive(Debug, Clone, Default)]
pub struct SaveContext {
    names: HashMap<NameId, String>,
    ids: HashMap<String, Vec<NameId>>,
    constant_names: Option<&'static phf::Map<u32, &'static str>>,
    /// Section (map part) names referenced by index from object headers
    pub sections: Vec<String>,
    generate_unknown_names: bool,
}

impl SaveContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from an ordered list of names (index `i` gets id `i | DYNAMIC_NAME_FLAG`)
    pub fn with_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut context = Self::new();
        for (i, name) in names.into_iter().enumerate() {
            context.insert(i as u32 | DYNAMIC_NAME_FLAG, name);
        }
        context
    }

    /// Register a name under an explicit id
    pub fn insert(&mut self, id: NameId, name: impl Into<String>) {
        let name = name.into();
        if let Some(previous) = self.names.insert(id, name.clone()) {
            if let Some(ids) = self.ids.get_mut(&previous) {
                ids.retain(|&existing| existing != id);
            }
        }
        self.ids.entry(name).or_default().push(id);
    }

    /// Attach the fixed constant table used by compressed blobs
    pub fn attach_constant_names(&mut self) {
        self.constant_names = Some(&CONSTANT_NAMES);
    }

    pub fn set_generate_unknown_names(&mut self, enabled: bool) {
        self.generate_unknown_names = enabled;
    }

    pub fn generates_unknown_names(&self) -> bool {
        self.generate_unknown_names
    }

    /// Whether names are stored as ids (otherwise they are inline strings)
    pub fn has_name_table(&self) -> bool {
        !self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Resolve an id, synthesizing a placeholder only if enabled on the context
    pub fn name(&self, id: NameId) -> Option<String> {
        self.lookup(id, self.generate_unknown_names)
    }

    /// Resolve an id with an explicit synthesis choice
    pub fn lookup(&self, id: NameId, synthesize: bool) -> Option<String> {
        if let Some(name) = self.names.get(&id) {
            return Some(name.clone());
        }
        if id & DYNAMIC_NAME_FLAG == 0 {
            if let Some(name) = self.constant_names.and_then(|table| table.get(&id)) {
                return Some((*name).to_string());
            }
        }
        synthesize.then(|| unknown_name(id))
    }

    /// Resolve a dynamic-table id only; used by scans over raw bytes
    pub fn dynamic_name(&self, id: NameId) -> Option<&str> {
        if id & DYNAMIC_NAME_FLAG == 0 {
            return None;
        }
        self.names.get(&id).map(String::as_str)
    }

    /// Reverse lookup; the dynamic table wins over the constant table
    pub fn name_id(&self, name: &str) -> Result<Option<NameId>> {
        if let Some(ids) = self.ids.get(name) {
            return match ids.as_slice() {
                [] => Ok(None),
                [id] => Ok(Some(*id)),
                _ => Err(Error::AmbiguousName(name.to_string())),
            };
        }

        let Some(table) = self.constant_names else {
            return Ok(None);
        };
        let mut matches = table.entries().filter(|(_, value)| **value == name);
        match (matches.next(), matches.next()) {
            (None, _) => Ok(None),
            (Some((id, _)), None) => Ok(Some(*id)),
            (Some(_), Some(_)) => Err(Error::AmbiguousName(name.to_string())),
        }
    }

    /// Look up a section name by index; out of range is absent
    pub fn section(&self, index: i32) -> Option<&str> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.sections.get(i))
            .map(String::as_str)
    }

    /// All dynamic names ordered by id
    pub fn names(&self) -> Vec<(NameId, &str)> {
        let mut all: Vec<_> = self
            .names
            .iter()
            .map(|(id, name)| (*id, name.as_str()))
            .collect();
        all.sort_by_key(|(id, _)| *id);
        all
    }
}

/// Deterministic placeholder for an id missing from every table
pub fn unknown_name(id: NameId) -> String {
    format!("__UnknownName_{id:#010x}")
}

/// A name as stored on the wire: base string plus instance number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameRef {
    pub base: String,
    /// 0 = unnumbered, `n` displays as `<base>_<n-1>`
    pub number: u32,
}

impl NameRef {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            number: 0,
        }
    }

    pub fn numbered(base: impl Into<String>, number: u32) -> Self {
        Self {
            base: base.into(),
            number,
        }
    }

    pub fn display(&self) -> String {
        match self.number {
            0 => self.base.clone(),
            n => format!("{}_{}", self.base, n - 1),
        }
    }
}

impl ByteCursor {
    /// Read a wire name: a table id (or inline string without a table) plus its instance number
    pub fn read_name_ref(&mut self, context: &SaveContext) -> Result<NameRef> {
        let offset = self.position();
        let base = if context.has_name_table() {
            let id = self.read_u32()?;
            context
                .name(id)
                .ok_or(Error::UnknownNameId { id, offset })?
        } else {
            self.read_string()?
        };
        let number = self.read_u32()?;
        Ok(NameRef { base, number })
    }

    /// Read a wire name and render it with its instance suffix
    pub fn read_name(&mut self, context: &SaveContext) -> Result<String> {
        self.read_name_ref(context).map(|name| name.display())
    }

    pub fn validate_name(&mut self, context: &SaveContext, expected: &str) -> Result<()> {
        let offset = self.position();
        let actual = self.read_name(context)?;
        if actual != expected {
            return Err(Error::Mismatch {
                offset,
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(())
    }

    /// Read an `i32` section index and resolve it
    pub fn read_part(&mut self, context: &SaveContext) -> Result<Option<String>> {
        let index = self.read_i32()?;
        Ok(context.section(index).map(str::to_string))
    }

    /// Write a wire name, resolving `base` against the context's table
    pub fn write_name(&mut self, context: &SaveContext, name: &NameRef) -> Result<()> {
        let mut encoded = Vec::new();
        encode_name(&mut encoded, context, name)?;
        self.write_bytes(&encoded);
        Ok(())
    }
}

/// Append the wire encoding of `name` to `out`
pub(crate) fn encode_name(out: &mut Vec<u8>, context: &SaveContext, name: &NameRef) -> Result<()> {
    if context.has_name_table() {
        let id = context
            .name_id(&name.base)?
            .ok_or_else(|| Error::NameNotFound {
                name: name.base.clone(),
                blueprint: None,
            })?;
        out.extend_from_slice(&id.to_le_bytes());
    } else {
        crate::cursor::encode_string(out, &name.base);
    }
    out.extend_from_slice(&name.number.to_le_bytes());
    Ok(())
}
