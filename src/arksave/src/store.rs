//! Object and actor-transform storage.
//!
//! [`ObjectStore`] is the persistence seam: anything that can hold UUID-keyed
//! blobs. [`ObjectDatabase`] layers the save-level operations on top of it
//! (duplicate checks, decoded views, re-identification) and owns the
//! actor-transform table.

use std::collections::{BTreeMap, HashMap};

use uuid::Uuid;

use crate::cursor::ByteCursor;
use crate::editor::{renumber_name, replace_uuid};
use crate::names::SaveContext;
use crate::object::GameObject;
use crate::transform::{read_actor_transforms, ActorTransform, TransformRecord};
use crate::{Error, Result};

/// Storage backend for object blobs
pub trait ObjectStore {
    /// Get the blob for an object
    fn get(&self, uuid: &Uuid) -> Result<Option<Vec<u8>>>;

    /// Store a blob under a new key
    fn insert(&mut self, uuid: Uuid, bytes: Vec<u8>) -> Result<()>;

    /// Replace the blob for an existing key
    fn update(&mut self, uuid: Uuid, bytes: Vec<u8>) -> Result<()>;

    /// Delete an object, returning whether it existed
    fn remove(&mut self, uuid: &Uuid) -> Result<bool>;

    fn contains(&self, uuid: &Uuid) -> Result<bool>;

    /// All keys, in the store's natural order
    fn uuids(&self) -> Result<Vec<Uuid>>;

    /// Persist pending writes
    fn flush(&mut self) -> Result<()>;
}

/// In-memory store ordered by UUID
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    objects: BTreeMap<Uuid, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bulk-load from `(uuid, blob)` pairs
    pub fn from_blobs<I>(blobs: I) -> Self
    where
        I: IntoIterator<Item = (Uuid, Vec<u8>)>,
    {
        Self {
            objects: blobs.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<Uuid, Vec<u8>> {
        self.objects
    }
}

impl ObjectStore for MemoryStore {
    fn get(&self, uuid: &Uuid) -> Result<Option<Vec<u8>>> {
        Ok(self.objects.get(uuid).cloned())
    }

    fn insert(&mut self, uuid: Uuid, bytes: Vec<u8>) -> Result<()> {
        self.objects.insert(uuid, bytes);
        Ok(())
    }

    fn update(&mut self, uuid: Uuid, bytes: Vec<u8>) -> Result<()> {
        self.objects.insert(uuid, bytes);
        Ok(())
    }

    fn remove(&mut self, uuid: &Uuid) -> Result<bool> {
        Ok(self.objects.remove(uuid).is_some())
    }

    fn contains(&self, uuid: &Uuid) -> Result<bool> {
        Ok(self.objects.contains_key(uuid))
    }

    fn uuids(&self) -> Result<Vec<Uuid>> {
        Ok(self.objects.keys().copied().collect())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Options for bulk object reads
#[derive(Default)]
pub struct ReaderConfig {
    blueprint_filter: Option<Box<dyn Fn(&str) -> bool>>,
    /// Log and skip objects that fail to decode instead of failing the read
    pub skip_invalid: bool,
}

impl ReaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only decode objects whose blueprint passes `filter`
    pub fn with_blueprint_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&str) -> bool + 'static,
    {
        self.blueprint_filter = Some(Box::new(filter));
        self
    }

    pub fn with_skip_invalid(mut self, skip: bool) -> Self {
        self.skip_invalid = skip;
        self
    }

    fn accepts(&self, blueprint: &str) -> bool {
        self.blueprint_filter
            .as_ref()
            .map_or(true, |filter| filter(blueprint))
    }
}

impl std::fmt::Debug for ReaderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderConfig")
            .field("blueprint_filter", &self.blueprint_filter.is_some())
            .field("skip_invalid", &self.skip_invalid)
            .finish()
    }
}

/// Save-level view over an [`ObjectStore`] plus the actor-transform table
pub struct ObjectDatabase<S: ObjectStore = MemoryStore> {
    store: S,
    actor_table: Vec<u8>,
    transforms: Vec<TransformRecord>,
    transform_index: HashMap<Uuid, usize>,
}

impl<S: ObjectStore> ObjectDatabase<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            actor_table: Uuid::nil().as_bytes().to_vec(),
            transforms: Vec::new(),
            transform_index: HashMap::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Store a new object; an existing UUID is an error
    pub fn add(&mut self, uuid: Uuid, bytes: Vec<u8>) -> Result<()> {
        if self.store.contains(&uuid)? {
            return Err(Error::DuplicateUuid(uuid));
        }
        tracing::debug!(%uuid, size = bytes.len(), "Adding object");
        self.store.insert(uuid, bytes)
    }

    pub fn get(&self, uuid: &Uuid) -> Result<Vec<u8>> {
        self.store.get(uuid)?.ok_or(Error::NotFound(*uuid))
    }

    pub fn contains(&self, uuid: &Uuid) -> Result<bool> {
        self.store.contains(uuid)
    }

    /// Replace an object's bytes
    ///
    /// The new bytes are stored as given; keeping them consistent with the
    /// rest of the save is up to the caller.
    pub fn modify(&mut self, uuid: Uuid, bytes: Vec<u8>) -> Result<()> {
        if !self.store.contains(&uuid)? {
            return Err(Error::NotFound(uuid));
        }
        self.store.update(uuid, bytes)
    }

    /// Delete an object and its transform, returning its bytes
    pub fn remove(&mut self, uuid: &Uuid) -> Result<Vec<u8>> {
        let bytes = self.get(uuid)?;
        self.store.remove(uuid)?;
        if let Some(index) = self.transform_index.get(uuid).copied() {
            let record = self.transforms[index];
            let start = record.offset - 16;
            self.actor_table
                .drain(start..start + ActorTransform::RECORD_SIZE);
            self.reload_actor_transforms()?;
        }
        Ok(bytes)
    }

    pub fn cursor(&self, uuid: &Uuid) -> Result<ByteCursor> {
        Ok(ByteCursor::new(self.get(uuid)?))
    }

    pub fn game_object(&self, context: &SaveContext, uuid: &Uuid) -> Result<GameObject> {
        GameObject::read(*uuid, &mut self.cursor(uuid)?, context)
    }

    /// Decode every object accepted by `config`
    pub fn game_objects(
        &self,
        context: &SaveContext,
        config: &ReaderConfig,
    ) -> Result<BTreeMap<Uuid, GameObject>> {
        let mut objects = BTreeMap::new();
        let mut skipped = 0usize;

        for uuid in self.store.uuids()? {
            let bytes = self.get(&uuid)?;
            let decoded = GameObject::peek_blueprint(&bytes, context).and_then(|blueprint| {
                if config.accepts(&blueprint) {
                    GameObject::from_bytes(uuid, &bytes, context).map(Some)
                } else {
                    Ok(None)
                }
            });

            match decoded {
                Ok(Some(object)) => {
                    objects.insert(uuid, object);
                }
                Ok(None) => {}
                Err(e) if config.skip_invalid => {
                    tracing::warn!(%uuid, error = %e, "Skipping unreadable object");
                    skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        tracing::debug!(read = objects.len(), skipped, "Read game objects");
        Ok(objects)
    }

    /// Move an object to a new UUID
    ///
    /// Every occurrence of the old UUID in the blob is replaced, the display
    /// name is reset to unnumbered, the store key moves and the object's
    /// actor transform follows it. Returns the new id.
    pub fn reidentify(
        &mut self,
        context: &SaveContext,
        uuid: &Uuid,
        new_uuid: Option<Uuid>,
    ) -> Result<Uuid> {
        let new_uuid = new_uuid.unwrap_or_else(Uuid::new_v4);
        if self.store.contains(&new_uuid)? {
            return Err(Error::DuplicateUuid(new_uuid));
        }

        let mut cursor = self.cursor(uuid)?;
        replace_uuid(cursor.as_bytes_mut(), uuid, &new_uuid);
        renumber_name(&mut cursor, context, None)?;

        self.store.remove(uuid)?;
        self.store.insert(new_uuid, cursor.into_inner())?;

        if let Some(index) = self.transform_index.remove(uuid) {
            let record = &mut self.transforms[index];
            let start = record.offset - 16;
            self.actor_table[start..record.offset].copy_from_slice(new_uuid.as_bytes());
            record.uuid = new_uuid;
            self.transform_index.insert(new_uuid, index);
        }
        tracing::debug!(old = %uuid, new = %new_uuid, "Reidentified object");
        Ok(new_uuid)
    }

    /// Store a re-identified copy of an object, returning the copy's UUID
    ///
    /// A placed object's copy gets its own transform record at the same spot.
    pub fn clone_object(&mut self, context: &SaveContext, uuid: &Uuid) -> Result<Uuid> {
        let new_uuid = Uuid::new_v4();
        let mut cursor = self.cursor(uuid)?;
        replace_uuid(cursor.as_bytes_mut(), uuid, &new_uuid);
        renumber_name(&mut cursor, context, None)?;
        self.add(new_uuid, cursor.into_inner())?;

        if let Some(transform) = self.actor_transform(uuid).copied() {
            self.add_actor_transforms(&transform.to_record(&new_uuid))?;
        }
        Ok(new_uuid)
    }

    /// Replace the actor-transform table with `bytes` (records + nil sentinel)
    pub fn load_actor_transforms(&mut self, bytes: Vec<u8>) -> Result<()> {
        self.actor_table = bytes;
        self.reload_actor_transforms()
    }

    fn reload_actor_transforms(&mut self) -> Result<()> {
        let mut cursor = ByteCursor::from_slice(&self.actor_table);
        self.transforms = read_actor_transforms(&mut cursor)?;
        self.transform_index = self
            .transforms
            .iter()
            .enumerate()
            .map(|(i, record)| (record.uuid, i))
            .collect();
        Ok(())
    }

    /// Offset of the sentinel that ends the table
    fn sentinel_offset(&self) -> usize {
        self.transforms
            .last()
            .map_or(0, |record| record.offset + ActorTransform::SIZE)
    }

    /// Append packed `uuid + payload` records before the sentinel
    ///
    /// A nil UUID is the table's end marker and is refused as a record id.
    pub fn add_actor_transforms(&mut self, records: &[u8]) -> Result<()> {
        if records.len() % ActorTransform::RECORD_SIZE != 0 {
            return Err(Error::format(
                records.len(),
                format!(
                    "transform records must be a multiple of {} bytes",
                    ActorTransform::RECORD_SIZE
                ),
            ));
        }

        for (i, record) in records
            .chunks_exact(ActorTransform::RECORD_SIZE)
            .enumerate()
        {
            if record[..16] == *Uuid::nil().as_bytes() {
                return Err(Error::format(
                    i * ActorTransform::RECORD_SIZE,
                    "transform record has the nil UUID",
                ));
            }
        }

        let at = self.sentinel_offset();
        self.actor_table.splice(at..at, records.iter().copied());
        self.reload_actor_transforms()?;
        tracing::debug!(
            added = records.len() / ActorTransform::RECORD_SIZE,
            total = self.transforms.len(),
            "Added actor transforms"
        );
        Ok(())
    }

    /// Overwrite one transform in place, or append it if the UUID has none
    pub fn set_actor_transform(&mut self, uuid: &Uuid, transform: &ActorTransform) -> Result<()> {
        match self.transform_index.get(uuid).copied() {
            Some(index) => {
                let record = &mut self.transforms[index];
                self.actor_table[record.offset..record.offset + ActorTransform::SIZE]
                    .copy_from_slice(&transform.to_bytes());
                record.transform = *transform;
                Ok(())
            }
            None => self.add_actor_transforms(&transform.to_record(uuid)),
        }
    }

    pub fn actor_transform(&self, uuid: &Uuid) -> Option<&ActorTransform> {
        self.transform_index
            .get(uuid)
            .map(|&index| &self.transforms[index].transform)
    }

    /// Transforms in table order
    pub fn actor_transforms(&self) -> impl Iterator<Item = (&Uuid, &ActorTransform)> {
        self.transforms
            .iter()
            .map(|record| (&record.uuid, &record.transform))
    }

    /// Serialized table, sentinel included
    pub fn actor_table_bytes(&self) -> &[u8] {
        &self.actor_table
    }

    pub fn flush(&mut self) -> Result<()> {
        self.store.flush()
    }
}

impl Default for ObjectDatabase<MemoryStore> {
    fn default() -> Self {
        Self::new(MemoryStore::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::tests::{context, dodo_blob};
    use crate::transform::Vector;

    fn database() -> (ObjectDatabase, Uuid) {
        let ctx = context();
        let uuid = Uuid::from_u128(0x1234);
        let inventory = Uuid::from_u128(0x5678);
        let mut db = ObjectDatabase::default();
        db.add(uuid, dodo_blob(&ctx, 7, inventory)).unwrap();
        (db, uuid)
    }

    #[test]
    fn test_add_get_modify() {
        let (mut db, uuid) = database();

        assert!(matches!(db.add(uuid, vec![1]), Err(Error::DuplicateUuid(u)) if u == uuid));

        db.modify(uuid, vec![9, 9]).unwrap();
        assert_eq!(db.get(&uuid).unwrap(), vec![9, 9]);

        let missing = Uuid::from_u128(1);
        let err = db.get(&missing).unwrap_err();
        assert!(err.is_recoverable());
        assert!(matches!(db.modify(missing, vec![]), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_game_object_view() {
        let (db, uuid) = database();
        let object = db.game_object(&context(), &uuid).unwrap();
        assert_eq!(object.uuid, uuid);
        assert_eq!(object.name_number(), 7);
    }

    #[test]
    fn test_game_objects_filter_and_skip() {
        let ctx = context();
        let (mut db, uuid) = database();
        let broken = Uuid::from_u128(0xBAD);
        let mut blob = dodo_blob(&ctx, 1, Uuid::nil());
        blob.truncate(blob.len() - 6);
        db.add(broken, blob).unwrap();

        let strict = ReaderConfig::new();
        assert!(db.game_objects(&ctx, &strict).is_err());

        let lenient = ReaderConfig::new().with_skip_invalid(true);
        let objects = db.game_objects(&ctx, &lenient).unwrap();
        assert_eq!(objects.keys().copied().collect::<Vec<_>>(), vec![uuid]);

        let filtered = ReaderConfig::new()
            .with_blueprint_filter(|bp| bp.contains("Cryopod"))
            .with_skip_invalid(true);
        assert!(db.game_objects(&ctx, &filtered).unwrap().is_empty());
    }

    #[test]
    fn test_reidentify_moves_key_and_resets_number() {
        let ctx = context();
        let (mut db, uuid) = database();

        // Blob that references its own UUID
        let mut blob = db.get(&uuid).unwrap();
        blob.extend_from_slice(uuid.as_bytes());
        db.modify(uuid, blob).unwrap();

        let new_uuid = Uuid::from_u128(0xAAAA);
        assert_eq!(db.reidentify(&ctx, &uuid, Some(new_uuid)).unwrap(), new_uuid);

        assert!(!db.contains(&uuid).unwrap());
        let bytes = db.get(&new_uuid).unwrap();
        assert_eq!(&bytes[bytes.len() - 16..], new_uuid.as_bytes());

        let object = db.game_object(&ctx, &new_uuid).unwrap();
        assert_eq!(object.name_number(), 0);
    }

    #[test]
    fn test_clone_object() {
        let ctx = context();
        let (mut db, uuid) = database();
        let copy = db.clone_object(&ctx, &uuid).unwrap();

        assert_ne!(copy, uuid);
        assert!(db.contains(&uuid).unwrap());
        assert_eq!(db.store().len(), 2);
        assert_eq!(db.game_object(&ctx, &copy).unwrap().name_number(), 0);
    }

    #[test]
    fn test_actor_transform_table() {
        let (mut db, _) = database();
        let a = Uuid::from_u128(10);
        let b = Uuid::from_u128(11);

        let mut table = ActorTransform::at(Vector::new(1.0, 2.0, 3.0)).to_record(&a);
        table.extend_from_slice(Uuid::nil().as_bytes());
        db.load_actor_transforms(table).unwrap();
        assert_eq!(db.actor_transforms().count(), 1);

        let added = ActorTransform::at(Vector::new(5.0, 5.0, 5.0));
        db.add_actor_transforms(&added.to_record(&b)).unwrap();

        let uuids: Vec<Uuid> = db.actor_transforms().map(|(u, _)| *u).collect();
        assert_eq!(uuids, vec![a, b]);
        assert_eq!(db.actor_transform(&b), Some(&added));
        assert!(db.actor_transforms().all(|(u, _)| !u.is_nil()));
        assert_eq!(
            &db.actor_table_bytes()[2 * ActorTransform::RECORD_SIZE..],
            Uuid::nil().as_bytes()
        );
    }

    #[test]
    fn test_set_actor_transform_in_place() {
        let (mut db, _) = database();
        let a = Uuid::from_u128(10);
        db.set_actor_transform(&a, &ActorTransform::default()).unwrap();
        let size = db.actor_table_bytes().len();

        let moved = ActorTransform::at(Vector::new(100.0, 0.0, -50.0));
        db.set_actor_transform(&a, &moved).unwrap();
        assert_eq!(db.actor_table_bytes().len(), size);
        assert_eq!(db.actor_transform(&a), Some(&moved));

        // Survives a reload from the raw bytes
        let bytes = db.actor_table_bytes().to_vec();
        db.load_actor_transforms(bytes).unwrap();
        assert_eq!(db.actor_transform(&a), Some(&moved));
    }

    #[test]
    fn test_reidentify_retargets_transform() {
        let ctx = context();
        let (mut db, uuid) = database();
        let spot = ActorTransform::at(Vector::new(-20.0, 40.0, 1.5));
        db.set_actor_transform(&uuid, &spot).unwrap();

        let new_uuid = db.reidentify(&ctx, &uuid, None).unwrap();
        assert!(db.actor_transform(&uuid).is_none());
        assert_eq!(db.actor_transform(&new_uuid), Some(&spot));
        assert_eq!(&db.actor_table_bytes()[..16], new_uuid.as_bytes());

        let bytes = db.actor_table_bytes().to_vec();
        db.load_actor_transforms(bytes).unwrap();
        assert_eq!(db.actor_transform(&new_uuid), Some(&spot));
    }

    #[test]
    fn test_clone_object_copies_transform() {
        let ctx = context();
        let (mut db, uuid) = database();
        let spot = ActorTransform::at(Vector::new(3.0, 2.0, 1.0));
        db.set_actor_transform(&uuid, &spot).unwrap();

        let copy = db.clone_object(&ctx, &uuid).unwrap();
        assert_eq!(db.actor_transform(&uuid), Some(&spot));
        assert_eq!(db.actor_transform(&copy), Some(&spot));
        assert_eq!(db.actor_transforms().count(), 2);
    }

    #[test]
    fn test_nil_transform_record_rejected() {
        let (mut db, _) = database();
        let mut records = ActorTransform::default().to_record(&Uuid::nil());
        records.extend(ActorTransform::default().to_record(&Uuid::from_u128(7)));

        let err = db.add_actor_transforms(&records).unwrap_err();
        assert!(matches!(err, Error::Format { offset: 0, .. }));
        assert_eq!(db.actor_transforms().count(), 0);
        assert_eq!(db.actor_table_bytes(), Uuid::nil().as_bytes());
    }

    #[test]
    fn test_bad_record_length() {
        let (mut db, _) = database();
        assert!(matches!(
            db.add_actor_transforms(&[0u8; 10]),
            Err(Error::Format { .. })
        ));
    }

    #[test]
    fn test_remove_drops_transform() {
        let ctx = context();
        let (mut db, uuid) = database();
        db.set_actor_transform(&uuid, &ActorTransform::default()).unwrap();

        db.remove(&uuid).unwrap();
        assert!(db.actor_transform(&uuid).is_none());
        assert_eq!(db.actor_table_bytes(), Uuid::nil().as_bytes());
        assert!(db.game_object(&ctx, &uuid).is_err());
    }
}
