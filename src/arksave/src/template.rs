//! Templates and subgraph transfer between saves.
//!
//! An exported object is a raw blob (`<prefix><uuid>.bin`) plus a side file
//! (`<prefix><uuid>_n.json`) mapping byte offsets to the names stored there.
//! The side file is what lets a blob authored against one name table be
//! spliced into a save with another.
//!
//! A subgraph directory holds:
//! - `itm_<uuid>.bin`, `inv_<uuid>.bin`, `str_<uuid>.bin`, `obj_<uuid>.bin` with side files
//! - `loc_<uuid>.json` actor transforms
//! - `base.json` naming the keystone object

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::cursor::ByteCursor;
use crate::editor::{find_names, renumber_name, replace_name_ids, replace_uuid, UuidMap};
use crate::names::SaveContext;
use crate::object::{GameObject, ObjectKind};
use crate::property::Value;
use crate::store::{ObjectDatabase, ObjectStore};
use crate::transform::ActorTransform;
use crate::{Error, Result};

/// Name of the keystone manifest in a subgraph directory
pub const MANIFEST_FILE: &str = "base.json";

/// Role of a file in a subgraph directory, encoded as its name prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FileKind {
    Item,
    Inventory,
    Structure,
    Object,
    Location,
}

impl FileKind {
    /// Import order: contents before their containers
    const BLOBS: [FileKind; 4] = [
        FileKind::Item,
        FileKind::Inventory,
        FileKind::Structure,
        FileKind::Object,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            FileKind::Item => "itm_",
            FileKind::Inventory => "inv_",
            FileKind::Structure => "str_",
            FileKind::Object => "obj_",
            FileKind::Location => "loc_",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        Some(match prefix {
            "itm" => FileKind::Item,
            "inv" => FileKind::Inventory,
            "str" => FileKind::Structure,
            "obj" => FileKind::Object,
            "loc" => FileKind::Location,
            _ => return None,
        })
    }

    fn for_object(kind: ObjectKind) -> Self {
        match kind {
            ObjectKind::Item | ObjectKind::Cryopod => FileKind::Item,
            ObjectKind::Inventory => FileKind::Inventory,
            ObjectKind::Structure { .. } => FileKind::Structure,
            ObjectKind::Creature { .. } | ObjectKind::Other => FileKind::Object,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    keystone: Uuid,
}

fn names_path(blob_path: &Path) -> PathBuf {
    let stem = blob_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    blob_path.with_file_name(format!("{stem}_n.json"))
}

fn read_names(path: &Path) -> Result<BTreeMap<usize, String>> {
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

/// Split `itm_<uuid>.bin` into its kind and UUID
fn parse_file_name(path: &Path) -> Option<(FileKind, Uuid)> {
    let stem = path.file_stem()?.to_str()?;
    let (prefix, id) = stem.split_once('_')?;
    Some((FileKind::from_prefix(prefix)?, Uuid::parse_str(id).ok()?))
}

/// A stored blob plus the names it references by offset
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    /// Identity the blob was exported under, replaced on instantiation
    pub uuid: Option<Uuid>,
    pub bytes: Vec<u8>,
    pub names: BTreeMap<usize, String>,
}

impl Template {
    pub fn new(bytes: Vec<u8>, names: BTreeMap<usize, String>) -> Self {
        Self {
            uuid: None,
            bytes,
            names,
        }
    }

    /// Capture an object from a save
    pub fn from_object<S: ObjectStore>(
        db: &ObjectDatabase<S>,
        context: &SaveContext,
        uuid: &Uuid,
    ) -> Result<Self> {
        let bytes = db.get(uuid)?;
        let names = find_names(&bytes, context);
        Ok(Self {
            uuid: Some(*uuid),
            bytes,
            names,
        })
    }

    /// Load `<stem>.bin` and its `<stem>_n.json` side file
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let names = read_names(&names_path(path))?;
        Ok(Self {
            uuid: parse_file_name(path).map(|(_, uuid)| uuid),
            bytes,
            names,
        })
    }

    /// Write the blob to `path` and the side file beside it
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, &self.bytes)?;
        fs::write(names_path(path), serde_json::to_string_pretty(&self.names)?)?;
        Ok(())
    }

    /// Splice a copy into `db` under a fresh UUID, returning it
    ///
    /// Name ids are rewritten against `context`; every name the template
    /// references must already be registered there.
    pub fn instantiate<S: ObjectStore>(
        &self,
        db: &mut ObjectDatabase<S>,
        context: &SaveContext,
    ) -> Result<Uuid> {
        let mut cursor = ByteCursor::new(self.bytes.clone());
        replace_name_ids(&mut cursor, context, &self.names)?;

        let new_uuid = Uuid::new_v4();
        if let Some(old) = self.uuid {
            replace_uuid(cursor.as_bytes_mut(), &old, &new_uuid);
        }
        db.add(new_uuid, cursor.into_inner())?;
        tracing::debug!(uuid = %new_uuid, names = self.names.len(), "Instantiated template");
        Ok(new_uuid)
    }
}

/// Write one object as `<prefix><uuid>.bin` plus side file, returning the blob path
pub fn export_object<S: ObjectStore>(
    db: &ObjectDatabase<S>,
    context: &SaveContext,
    uuid: &Uuid,
    dir: &Path,
    prefix: &str,
) -> Result<PathBuf> {
    let path = dir.join(format!("{prefix}{uuid}.bin"));
    Template::from_object(db, context, uuid)?.save(&path)?;
    Ok(path)
}

/// Object ids directly owned by `object`: its inventory and inventory items
fn owned_objects(object: &GameObject) -> Vec<Uuid> {
    let mut owned: Vec<Uuid> = object.inventory().into_iter().collect();
    if let Some(Value::Array(items)) = object.property("InventoryItems").map(|p| &p.value) {
        owned.extend(items.iter().filter_map(Value::as_uuid));
    }
    owned
}

/// Export `roots` and everything they own into `dir`, with `keystone` as the anchor
///
/// Ownership is followed through `MyInventoryComponent` and `InventoryItems`.
/// Returns every blob written.
pub fn export_subgraph<S: ObjectStore>(
    db: &ObjectDatabase<S>,
    context: &SaveContext,
    keystone: &Uuid,
    roots: &[Uuid],
    dir: &Path,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;

    let mut pending: Vec<Uuid> = roots.to_vec();
    pending.push(*keystone);
    let mut seen = BTreeSet::new();
    let mut written = Vec::new();

    while let Some(uuid) = pending.pop() {
        if !seen.insert(uuid) {
            continue;
        }
        let object = db.game_object(context, &uuid)?;
        pending.extend(owned_objects(&object));

        let kind = FileKind::for_object(object.kind());
        written.push(export_object(db, context, &uuid, dir, kind.prefix())?);

        if let Some(transform) = db.actor_transform(&uuid) {
            let path = dir.join(format!("{}{uuid}.json", FileKind::Location.prefix()));
            fs::write(path, serde_json::to_string_pretty(transform)?)?;
        }
    }

    let manifest = Manifest {
        keystone: *keystone,
    };
    fs::write(dir.join(MANIFEST_FILE), serde_json::to_string_pretty(&manifest)?)?;

    tracing::info!(objects = written.len(), dir = %dir.display(), "Exported subgraph");
    Ok(written)
}

/// Outcome of [`import_subgraph`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportResult {
    /// Exported UUID → UUID in the destination save
    pub uuid_map: UuidMap,
    /// Keystone in the destination save, when the directory names one
    pub keystone: Option<Uuid>,
    /// Imported objects in import order
    pub objects: Vec<Uuid>,
}

struct ImportFile {
    kind: FileKind,
    uuid: Uuid,
    path: PathBuf,
}

/// Import a directory written by [`export_subgraph`] with random new UUIDs
pub fn import_subgraph<S: ObjectStore>(
    db: &mut ObjectDatabase<S>,
    context: &SaveContext,
    dir: &Path,
) -> Result<ImportResult> {
    import_subgraph_with(db, context, dir, &mut Uuid::new_v4)
}

/// Import a subgraph directory, drawing new UUIDs from `generate`
///
/// Every file gets one fresh UUID and the same mapping is applied to every
/// blob, so references inside the subgraph stay consistent. Each object is
/// numbered after the destination's instances of the same name, and an
/// imported inventory takes the number of the object that owns it.
///
/// Blobs and transforms are only added once every file has been rewritten
/// and decoded, so a failed import leaves `db` as it was.
pub fn import_subgraph_with<S, F>(
    db: &mut ObjectDatabase<S>,
    context: &SaveContext,
    dir: &Path,
    generate: &mut F,
) -> Result<ImportResult>
where
    S: ObjectStore,
    F: FnMut() -> Uuid,
{
    let mut files = Vec::new();
    let mut manifest = None;
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            e.into_io_error()
                .unwrap_or_else(|| std::io::Error::other("directory loop"))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.into_path();
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if file_name == MANIFEST_FILE {
            manifest = Some(path);
            continue;
        }
        if file_name.ends_with("_n.json") {
            continue;
        }
        let expected_ext = |kind: FileKind| match kind {
            FileKind::Location => "json",
            _ => "bin",
        };
        match parse_file_name(&path) {
            Some((kind, uuid))
                if path.extension().and_then(|e| e.to_str()) == Some(expected_ext(kind)) =>
            {
                files.push(ImportFile { kind, uuid, path });
            }
            _ => tracing::debug!(path = %path.display(), "Ignoring file"),
        }
    }

    let mut result = ImportResult::default();
    for file in &files {
        result.uuid_map.assign_with(file.uuid, generate);
    }

    // Everything is staged and checked before the destination is touched
    let mut records = Vec::new();
    for file in files.iter().filter(|f| f.kind == FileKind::Location) {
        let transform: ActorTransform = serde_json::from_str(&fs::read_to_string(&file.path)?)?;
        if let Some(new_uuid) = result.uuid_map.get(&file.uuid) {
            records.extend(transform.to_record(&new_uuid));
        }
    }

    let mut staged = Vec::new();
    let mut staged_ids = BTreeSet::new();
    for kind in FileKind::BLOBS {
        for file in files.iter().filter(|f| f.kind == kind) {
            let Some(new_uuid) = result.uuid_map.get(&file.uuid) else {
                continue;
            };
            if !staged_ids.insert(new_uuid) || db.contains(&new_uuid)? {
                return Err(Error::DuplicateUuid(new_uuid));
            }
            let template = Template::load(&file.path)?;
            let mut cursor = ByteCursor::new(template.bytes);
            result.uuid_map.apply(cursor.as_bytes_mut());
            replace_name_ids(&mut cursor, context, &template.names)?;
            let object = GameObject::read(new_uuid, &mut cursor, context)?;
            staged.push(StagedObject { object, cursor });
        }
    }

    assign_display_numbers(db, context, &mut staged)?;

    if !records.is_empty() {
        db.add_actor_transforms(&records)?;
    }
    for StagedObject { object, cursor } in staged {
        db.add(object.uuid, cursor.into_inner())?;
        result.objects.push(object.uuid);
    }

    if let Some(path) = manifest {
        let manifest: Manifest = serde_json::from_str(&fs::read_to_string(path)?)?;
        result.keystone = result.uuid_map.get(&manifest.keystone);
    }

    tracing::info!(
        objects = result.objects.len(),
        keystone = ?result.keystone,
        "Imported subgraph"
    );
    Ok(result)
}

/// A rewritten blob waiting to be added, with its decoded view
struct StagedObject {
    object: GameObject,
    cursor: ByteCursor,
}

/// Highest display number in use per display name base
fn used_numbers<S: ObjectStore>(
    db: &ObjectDatabase<S>,
    context: &SaveContext,
) -> Result<HashMap<String, u32>> {
    let mut used: HashMap<String, u32> = HashMap::new();
    for uuid in db.store().uuids()? {
        let bytes = db.get(&uuid)?;
        if let Ok(Some(name)) = GameObject::peek_display_name(&bytes, context) {
            let highest = used.entry(name.base).or_default();
            *highest = (*highest).max(name.number);
        }
    }
    Ok(used)
}

/// Number imported objects after the destination's own instances
///
/// Each object takes the next free number for its display name. An
/// inventory whose owner is imported alongside it takes the owner's number.
fn assign_display_numbers<S: ObjectStore>(
    db: &ObjectDatabase<S>,
    context: &SaveContext,
    staged: &mut [StagedObject],
) -> Result<()> {
    let mut used = used_numbers(db, context)?;
    let index: HashMap<Uuid, usize> = staged
        .iter()
        .enumerate()
        .map(|(i, s)| (s.object.uuid, i))
        .collect();

    let owned: HashMap<usize, usize> = staged
        .iter()
        .enumerate()
        .filter_map(|(owner, s)| {
            let inventory = s.object.inventory()?;
            index.get(&inventory).map(|&i| (i, owner))
        })
        .collect();

    let mut numbers = vec![0u32; staged.len()];
    for (i, entry) in staged.iter().enumerate() {
        if owned.contains_key(&i) {
            continue;
        }
        let Some(name) = entry.object.names.first() else {
            continue;
        };
        let highest = used.entry(name.base.clone()).or_default();
        *highest += 1;
        numbers[i] = *highest;
    }
    for (&inventory, &owner) in &owned {
        numbers[inventory] = numbers[owner];
    }

    for (entry, number) in staged.iter_mut().zip(numbers) {
        if entry.object.names.is_empty() {
            continue;
        }
        renumber_name(&mut entry.cursor, context, Some(number))?;
        entry.object.names[0].number = number;
    }
    Ok(())
}
