//! Export a storage box with its inventory and contents, then splice it into
//! a save with a different name table.

use anyhow::Context;
use arksave::cursor::ByteCursor;
use arksave::names::NameRef;
use arksave::property::{ObjectRef, PropertyWriter, TypeTree, Value};
use arksave::template::{export_subgraph, import_subgraph_with, MANIFEST_FILE};
use arksave::{ActorTransform, ObjectDatabase, ObjectKind, SaveContext, ValueType, Vector};
use tempfile::TempDir;
use uuid::Uuid;

const BOX_BP: &str = "/Game/PrimalEarth/Structures/StorageBox_Small.StorageBox_Small_C";
const INVENTORY_BP: &str = "/Game/PrimalEarth/CoreBlueprints/Inventories/PrimalInventoryBP_StorageBox_Small.PrimalInventoryBP_StorageBox_Small_C";
const SHIELD_BP: &str = "/Game/PrimalEarth/CoreBlueprints/Items/Armor/Shields/PrimalItemArmor_WoodShield.PrimalItemArmor_WoodShield_C";

const NAMES: [&str; 14] = [
    "None",
    BOX_BP,
    "StorageBox_Small_C",
    INVENTORY_BP,
    "PrimalInventoryBP_StorageBox_Small_C",
    SHIELD_BP,
    "PrimalItemArmor_WoodShield_C",
    "MyInventoryComponent",
    "ObjectProperty",
    "InventoryItems",
    "ArrayProperty",
    "OwnerInventory",
    "Durability",
    "FloatProperty",
];

fn structure_id() -> Uuid {
    Uuid::from_u128(0x7c3f9a12_5e4b_4d8a_9f21_3b6e8c0d4a57)
}

fn inventory_id() -> Uuid {
    Uuid::from_u128(0xb81d2e4f_93a6_47c5_8e0b_6f2a1d9c3e84)
}

fn item_id() -> Uuid {
    Uuid::from_u128(0xe4a7c9d2_1f3b_4e6a_b5c8_9d0e2f4a6b71)
}

fn object_blob(
    context: &SaveContext,
    blueprint: &str,
    display: NameRef,
    properties: &[(&str, TypeTree, Value)],
) -> arksave::Result<Vec<u8>> {
    let mut cursor = ByteCursor::default();
    cursor.write_name(context, &NameRef::new(blueprint))?;
    cursor.write_u32(0);
    cursor.write_u32(1);
    cursor.write_name(context, &display)?;
    cursor.write_i32(-1);

    let mut writer = PropertyWriter::new(context);
    for (name, tree, value) in properties {
        writer.property(name, tree, value)?;
    }
    cursor.write_bytes(&writer.finish()?);
    Ok(cursor.into_inner())
}

fn object_property() -> TypeTree {
    TypeTree::of(ValueType::Object)
}

fn source_save() -> arksave::Result<(ObjectDatabase, SaveContext)> {
    let context = SaveContext::with_names(NAMES);
    let mut db = ObjectDatabase::default();

    db.add(
        structure_id(),
        object_blob(
            &context,
            BOX_BP,
            NameRef::numbered("StorageBox_Small_C", 4),
            &[(
                "MyInventoryComponent",
                object_property(),
                Value::Object(ObjectRef::Id(inventory_id())),
            )],
        )?,
    )?;
    db.add(
        inventory_id(),
        object_blob(
            &context,
            INVENTORY_BP,
            NameRef::numbered("PrimalInventoryBP_StorageBox_Small_C", 4),
            &[(
                "InventoryItems",
                TypeTree::array(object_property()),
                Value::Array(vec![Value::Object(ObjectRef::Id(item_id()))]),
            )],
        )?,
    )?;
    db.add(
        item_id(),
        object_blob(
            &context,
            SHIELD_BP,
            NameRef::numbered("PrimalItemArmor_WoodShield_C", 9),
            &[
                (
                    "OwnerInventory",
                    object_property(),
                    Value::Object(ObjectRef::Id(inventory_id())),
                ),
                (
                    "Durability",
                    TypeTree::of(ValueType::Float),
                    Value::Float(87.5),
                ),
            ],
        )?,
    )?;

    db.set_actor_transform(
        &structure_id(),
        &ActorTransform::at(Vector::new(-1200.0, 4400.5, 310.0)),
    )?;

    Ok((db, context))
}

#[test]
fn export_writes_expected_files() -> anyhow::Result<()> {
    let (db, context) = source_save()?;
    let dir = TempDir::new()?;

    let written = export_subgraph(&db, &context, &structure_id(), &[], dir.path())?;
    assert_eq!(written.len(), 3);

    for name in [
        format!("str_{}.bin", structure_id()),
        format!("str_{}_n.json", structure_id()),
        format!("inv_{}.bin", inventory_id()),
        format!("itm_{}.bin", item_id()),
        format!("loc_{}.json", structure_id()),
        MANIFEST_FILE.to_string(),
    ] {
        assert!(dir.path().join(&name).is_file(), "missing {name}");
    }
    assert!(!dir.path().join(format!("loc_{}.json", item_id())).exists());
    Ok(())
}

#[test]
fn import_into_save_with_other_name_table() -> anyhow::Result<()> {
    let (source, source_context) = source_save()?;
    let dir = TempDir::new()?;
    export_subgraph(&source, &source_context, &structure_id(), &[], dir.path())?;

    // Destination registers the same names under different ids and already
    // holds a box numbered 6
    let mut reversed = NAMES.to_vec();
    reversed.reverse();
    let context = SaveContext::with_names(reversed);
    let mut db = ObjectDatabase::default();
    let existing = Uuid::from_u128(1);
    db.add(
        existing,
        object_blob(
            &context,
            BOX_BP,
            NameRef::numbered("StorageBox_Small_C", 6),
            &[],
        )?,
    )?;

    let mut next = 0xA000_0000_0000_4000_8000_0000_0000_0000u128;
    let mut generate = || {
        next += 0x0101_0101;
        Uuid::from_u128(next)
    };
    let result = import_subgraph_with(&mut db, &context, dir.path(), &mut generate)?;

    assert_eq!(result.objects.len(), 3);
    assert_eq!(result.uuid_map.len(), 3);
    let structure = result.uuid_map.get(&structure_id()).context("box not mapped")?;
    let inventory = result
        .uuid_map
        .get(&inventory_id())
        .context("inventory not mapped")?;
    let item = result.uuid_map.get(&item_id()).context("item not mapped")?;
    assert_eq!(result.keystone, Some(structure));

    // Contents are imported before their containers
    assert_eq!(result.objects, vec![item, inventory, structure]);

    let structure_obj = db.game_object(&context, &structure)?;
    assert_eq!(structure_obj.blueprint, BOX_BP);
    assert_eq!(structure_obj.inventory(), Some(inventory));
    assert_eq!(
        structure_obj.kind(),
        ObjectKind::Structure {
            has_inventory: true
        }
    );
    assert_eq!(structure_obj.name_number(), 7);

    let inventory_obj = db.game_object(&context, &inventory)?;
    assert_eq!(inventory_obj.name_number(), 7);
    let items = inventory_obj
        .property("InventoryItems")
        .and_then(|p| p.value.as_array())
        .context("no inventory items")?;
    assert_eq!(items[0].as_uuid(), Some(item));

    let item_obj = db.game_object(&context, &item)?;
    assert_eq!(item_obj.get_uuid("OwnerInventory"), Some(inventory));
    assert_eq!(item_obj.get_f64("Durability"), Some(87.5));
    assert_eq!(item_obj.name_number(), 1);

    assert_eq!(db.game_object(&context, &existing)?.name_number(), 6);

    // The old identities are gone from every imported blob
    for uuid in &result.objects {
        let bytes = db.get(uuid)?;
        for old in [structure_id(), inventory_id(), item_id()] {
            assert!(arksave::find_byte_sequence(&bytes, old.as_bytes()).is_empty());
        }
    }

    let transform = db.actor_transform(&structure).context("box not placed")?;
    assert_eq!(transform.position, Vector::new(-1200.0, 4400.5, 310.0));
    assert!(db.actor_transform(&item).is_none());
    Ok(())
}

#[test]
fn import_fails_when_destination_lacks_a_name() -> anyhow::Result<()> {
    let (source, source_context) = source_save()?;
    let dir = TempDir::new()?;
    export_subgraph(&source, &source_context, &structure_id(), &[], dir.path())?;

    // The item resolves; the inventory after it does not
    let context =
        SaveContext::with_names(NAMES.iter().copied().filter(|n| *n != "InventoryItems"));
    let mut db = ObjectDatabase::default();
    let err = import_subgraph_with(&mut db, &context, dir.path(), &mut Uuid::new_v4)
        .expect_err("import should fail");

    assert_eq!(err.category(), arksave::ErrorCategory::Identity);
    assert!(err.to_string().contains("InventoryItems"));

    // Nothing from the failed import is left behind
    assert!(db.store().is_empty());
    assert_eq!(db.actor_transforms().count(), 0);
    assert_eq!(db.actor_table_bytes(), Uuid::nil().as_bytes());
    Ok(())
}
