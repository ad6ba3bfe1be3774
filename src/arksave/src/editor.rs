//! Structural edits on raw object bytes.
//!
//! These operate below the property codec: identities are retargeted by
//! byte substitution and name ids are rewritten at recorded offsets, so the
//! rest of a blob stays bit-identical.
//!
//! UUID substitution matches any 16-byte run equal to the old UUID. A run of
//! unrelated data that happens to equal it is rewritten as well.

use std::collections::BTreeMap;

use byteorder::{ByteOrder, LittleEndian};
use memchr::memmem;
use serde::Serialize;
use uuid::Uuid;

use crate::cursor::ByteCursor;
use crate::names::SaveContext;
use crate::object::{display_number_offset, GameObject};
use crate::{Error, Result};

/// Replace every occurrence of `old` in `data` with `new`
///
/// Returns the number of replacements.
pub fn replace_uuid(data: &mut [u8], old: &Uuid, new: &Uuid) -> usize {
    let hits: Vec<usize> = memmem::find_iter(data, old.as_bytes()).collect();
    let mut replaced = 0;
    for offset in hits {
        data[offset..offset + 16].copy_from_slice(new.as_bytes());
        replaced += 1;
    }
    replaced
}

/// One old → new identity mapping applied across every blob of a subgraph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UuidMap {
    map: BTreeMap<Uuid, Uuid>,
}

impl UuidMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, old: Uuid, new: Uuid) {
        self.map.insert(old, new);
    }

    /// Map `old` to an id drawn from `generate`, reusing an existing mapping
    pub fn assign_with<F>(&mut self, old: Uuid, generate: &mut F) -> Uuid
    where
        F: FnMut() -> Uuid,
    {
        *self.map.entry(old).or_insert_with(generate)
    }

    /// Map `old` to a fresh random id
    pub fn assign(&mut self, old: Uuid) -> Uuid {
        self.assign_with(old, &mut Uuid::new_v4)
    }

    pub fn get(&self, old: &Uuid) -> Option<Uuid> {
        self.map.get(old).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Uuid, &Uuid)> {
        self.map.iter()
    }

    /// Apply every mapping to `data`, returning the total replacements
    pub fn apply(&self, data: &mut [u8]) -> usize {
        self.map
            .iter()
            .map(|(old, new)| replace_uuid(data, old, new))
            .sum()
    }
}

/// Set the instance number of an object's display name
///
/// `None` resets it to unnumbered. Only those four bytes change.
pub fn renumber_name(
    cursor: &mut ByteCursor,
    context: &SaveContext,
    number: Option<u32>,
) -> Result<()> {
    let offset = display_number_offset(cursor, context)?;
    cursor.replace_bytes(offset, &number.unwrap_or(0).to_le_bytes())?;
    cursor.set_position(0)
}

/// Rewrite name ids at recorded offsets to the ids of the same names in `context`
///
/// Used when a blob authored against one name table is spliced into a save
/// with another. Every name must already be registered in `context`.
pub fn replace_name_ids(
    cursor: &mut ByteCursor,
    context: &SaveContext,
    names: &BTreeMap<usize, String>,
) -> Result<()> {
    let size = cursor.size();
    let mut resolved = Vec::with_capacity(names.len());
    for (&offset, name) in names {
        let Some(id) = context.name_id(name)? else {
            // The blueprint is the blob's first name; the ids are still the source's
            let blueprint = names
                .get(&0)
                .cloned()
                .or_else(|| GameObject::peek_blueprint(cursor.as_bytes(), context).ok());
            return Err(Error::NameNotFound {
                name: name.clone(),
                blueprint,
            });
        };
        if offset.checked_add(4).map_or(true, |end| end > size) {
            return Err(Error::Truncated {
                offset,
                needed: 4,
                available: size.saturating_sub(offset),
            });
        }
        resolved.push((offset, id));
    }

    // Nothing is written until every name has resolved
    for (offset, id) in resolved {
        cursor.replace_bytes(offset, &id.to_le_bytes())?;
    }
    tracing::debug!(count = names.len(), "Rewrote name ids");
    Ok(())
}

/// Start offsets of every occurrence of `pattern`, overlapping ones included
pub fn find_byte_sequence(data: &[u8], pattern: &[u8]) -> Vec<usize> {
    if pattern.is_empty() {
        return Vec::new();
    }

    let finder = memmem::Finder::new(pattern);
    let mut results = Vec::new();
    let mut start = 0;
    while let Some(hit) = finder.find(&data[start..]) {
        results.push(start + hit);
        start += hit + 1;
    }
    results
}

/// Map offset → name for every `u32` that resolves in the dynamic name table
///
/// Constant ids are ignored and no placeholders are synthesized. After a hit
/// the scan resumes past that `u32`.
pub fn find_names(data: &[u8], context: &SaveContext) -> BTreeMap<usize, String> {
    let mut found = BTreeMap::new();
    let mut offset = 0;
    while offset + 4 <= data.len() {
        let id = LittleEndian::read_u32(&data[offset..offset + 4]);
        match context.dynamic_name(id) {
            Some(name) => {
                tracing::trace!(offset, id, name, "Found name");
                found.insert(offset, name.to_string());
                offset += 4;
            }
            None => offset += 1,
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::DYNAMIC_NAME_FLAG;
    use crate::object::tests::{context, dodo_blob, DODO};

    #[test]
    fn test_replace_uuid_twice() {
        let a = Uuid::from_u128(0x1111_2222_3333_4444_5555_6666_7777_8888);
        let b = Uuid::from_u128(0x9999);

        let mut data = vec![0xAB; 5];
        data.extend_from_slice(a.as_bytes());
        data.extend_from_slice(&[1, 2, 3]);
        data.extend_from_slice(a.as_bytes());
        data.push(0xCD);
        let original = data.clone();

        assert_eq!(replace_uuid(&mut data, &a, &b), 2);
        assert_eq!(&data[5..21], b.as_bytes());
        assert_eq!(&data[24..40], b.as_bytes());
        for (i, (x, y)) in data.iter().zip(&original).enumerate() {
            if !(5..21).contains(&i) && !(24..40).contains(&i) {
                assert_eq!(x, y, "byte {i} changed");
            }
        }
    }

    #[test]
    fn test_replace_uuid_absent() {
        let mut data = vec![0u8; 40];
        assert_eq!(replace_uuid(&mut data, &Uuid::from_u128(5), &Uuid::from_u128(6)), 0);
        assert_eq!(data, vec![0u8; 40]);
    }

    #[test]
    fn test_uuid_map_assign_is_stable() {
        let mut counter = 100u128;
        let mut generate = || {
            counter += 1;
            Uuid::from_u128(counter)
        };

        let mut map = UuidMap::new();
        let first = map.assign_with(Uuid::from_u128(1), &mut generate);
        let again = map.assign_with(Uuid::from_u128(1), &mut generate);
        let second = map.assign_with(Uuid::from_u128(2), &mut generate);

        assert_eq!(first, Uuid::from_u128(101));
        assert_eq!(again, first);
        assert_eq!(second, Uuid::from_u128(102));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_uuid_map_apply() {
        let (a, b) = (Uuid::from_u128(1), Uuid::from_u128(2));
        let mut data: Vec<u8> = [a, b, a].iter().flat_map(|id| *id.as_bytes()).collect();

        let mut map = UuidMap::new();
        map.insert(a, Uuid::from_u128(10));
        map.insert(b, Uuid::from_u128(20));

        assert_eq!(map.apply(&mut data), 3);
        assert_eq!(&data[16..32], Uuid::from_u128(20).as_bytes());
    }

    #[test]
    fn test_renumber_touches_only_number() {
        let ctx = context();
        let blob = dodo_blob(&ctx, 13, Uuid::from_u128(3));
        let mut cursor = ByteCursor::new(blob.clone());

        renumber_name(&mut cursor, &ctx, Some(2)).unwrap();
        let changed: Vec<usize> = (0..blob.len())
            .filter(|&i| blob[i] != cursor.as_bytes()[i])
            .collect();
        assert_eq!(changed, vec![20]);
        assert_eq!(cursor.as_bytes()[20], 2);

        renumber_name(&mut cursor, &ctx, None).unwrap();
        let object = GameObject::read(Uuid::nil(), &mut cursor, &ctx).unwrap();
        assert_eq!(object.name_number(), 0);
        assert_eq!(object.display_name().as_deref(), Some("Dodo_Character_BP_C"));
    }

    #[test]
    fn test_find_names_dynamic_only() {
        let mut ctx = SaveContext::with_names(["Zero", "One"]);
        ctx.attach_constant_names();

        let mut data = Vec::new();
        data.extend_from_slice(&(1 | DYNAMIC_NAME_FLAG).to_le_bytes());
        data.extend_from_slice(&15u32.to_le_bytes()); // constant IntProperty
        data.push(0x00);
        data.extend_from_slice(&DYNAMIC_NAME_FLAG.to_le_bytes());

        let names = find_names(&data, &ctx);
        assert_eq!(names.len(), 2);
        assert_eq!(names[&0], "One");
        // Final u32 ends exactly at the end of the buffer
        assert_eq!(names[&9], "Zero");
    }

    #[test]
    fn test_find_names_on_object() {
        let ctx = context();
        let blob = dodo_blob(&ctx, 0, Uuid::nil());
        let names = find_names(&blob, &ctx);
        assert_eq!(names[&0], DODO);
        assert_eq!(names[&16], "Dodo_Character_BP_C");
        assert!(names.values().any(|n| n == "MyInventoryComponent"));
    }

    #[test]
    fn test_replace_name_ids_between_tables() {
        let source = context();
        let blob = dodo_blob(&source, 3, Uuid::from_u128(4));
        let names = find_names(&blob, &source);

        // Same names in a different order
        let mut reordered: Vec<(u32, String)> = source
            .names()
            .into_iter()
            .map(|(id, name)| (id, name.to_string()))
            .collect();
        reordered.reverse();
        let mut dest = SaveContext::with_names(reordered.into_iter().map(|(_, n)| n));
        dest.sections = source.sections.clone();

        let mut cursor = ByteCursor::new(blob.clone());
        replace_name_ids(&mut cursor, &dest, &names).unwrap();

        let before = GameObject::from_bytes(Uuid::nil(), &blob, &source).unwrap();
        let after = GameObject::read(Uuid::nil(), &mut cursor, &dest).unwrap();
        assert_eq!(after.blueprint, before.blueprint);
        assert_eq!(after.names, before.names);
        assert_eq!(after.get_str("TamedName"), Some("Bob"));
    }

    #[test]
    fn test_replace_name_ids_missing_name() {
        let source = context();
        let blob = dodo_blob(&source, 0, Uuid::nil());
        let names = find_names(&blob, &source);

        let dest = SaveContext::with_names([DODO, "None"]);
        let mut cursor = ByteCursor::new(blob.clone());
        let err = replace_name_ids(&mut cursor, &dest, &names).unwrap_err();
        assert_eq!(err.category(), crate::ErrorCategory::Identity);
        assert_eq!(cursor.as_bytes(), &blob[..], "failed rewrite left partial edits");
        match err {
            Error::NameNotFound { name, blueprint } => {
                assert_eq!(name, "Dodo_Character_BP_C");
                assert_eq!(blueprint.as_deref(), Some(DODO));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_replace_name_ids_offset_out_of_range() {
        let ctx = context();
        let blob = dodo_blob(&ctx, 0, Uuid::nil());
        let mut names = find_names(&blob, &ctx);
        names.insert(usize::MAX - 1, "None".to_string());

        let mut cursor = ByteCursor::new(blob.clone());
        let err = replace_name_ids(&mut cursor, &ctx, &names).unwrap_err();
        assert!(matches!(err, Error::Truncated { needed: 4, .. }));
        assert_eq!(cursor.as_bytes(), &blob[..]);
    }

    #[test]
    fn test_find_byte_sequence_overlapping() {
        assert_eq!(find_byte_sequence(b"aaaa", b"aa"), vec![0, 1, 2]);
        assert_eq!(find_byte_sequence(b"xyzxyz", b"yz"), vec![1, 4]);
        assert!(find_byte_sequence(b"abc", b"").is_empty());
        assert!(find_byte_sequence(b"ab", b"abc").is_empty());
    }
}
