use std::fs;

use orgweave::forest::{ForestStore, OrgNode, Position};
use orgweave::snapshot::{FileStorage, STORAGE_KEY, load_or_default, save_to_storage};
use orgweave::test_support::{remove_dir_if_exists, temp_path};

#[test]
fn a_built_chart_survives_a_full_save_and_reload_cycle() {
    let root = temp_path("chart-persistence");
    let mut storage = FileStorage::new(&root);

    let mut store = ForestStore::new();
    store.add_position(position("p1", "CEO"));
    store.add_position(position("p2", "IT Support"));
    store.add_level();
    store.add_level();
    store.add_node(node("n1", "p1", "CEO", 1, None));
    store.add_node(node("n2", "p2", "IT Support", 2, Some("n1")));
    store.add_node(node("n3", "p2", "IT Support", 3, Some("n2")));
    store.remove_node("n2", true);

    save_to_storage(&mut storage, &store).expect("save should succeed");

    let reloaded = load_or_default(&FileStorage::new(&root));
    assert_eq!(reloaded.snapshot(), store.snapshot());

    // The promoted node carried its new parent and level through the disk
    // round trip.
    let n3 = reloaded.get_node_by_id("n3").expect("n3 should survive");
    assert_eq!(n3.parent_id.as_deref(), Some("n1"));
    assert_eq!(n3.level, 2);

    remove_dir_if_exists(&root);
}

#[test]
fn a_corrupt_stored_chart_degrades_to_the_default_seed() {
    let root = temp_path("chart-corrupt");
    fs::create_dir_all(&root).expect("storage root should be created");
    fs::write(root.join(format!("{STORAGE_KEY}.json")), "{\"positions\": [oops")
        .expect("corrupt payload should be written");

    let store = load_or_default(&FileStorage::new(&root));

    assert_eq!(store.positions().len(), 5);
    assert_eq!(store.levels().len(), 1);
    assert!(store.org_nodes().is_empty());

    remove_dir_if_exists(&root);
}

#[test]
fn level_removal_renumbers_and_persists_a_contiguous_range() {
    let root = temp_path("chart-level-removal");
    let mut storage = FileStorage::new(&root);

    let mut store = ForestStore::new();
    store.add_level();
    store.add_level();
    store.add_node(node("n1", "p1", "CEO", 1, None));
    store.add_node(node("n2", "p2", "Dev", 2, Some("n1")));
    store.add_node(node("n3", "p2", "Dev", 3, Some("n2")));

    assert!(!store.remove_level(1));
    assert!(store.remove_level(2));
    save_to_storage(&mut storage, &store).expect("save should succeed");

    let reloaded = load_or_default(&FileStorage::new(&root));
    let numbers = reloaded
        .levels()
        .iter()
        .map(|level| level.level_number)
        .collect::<Vec<_>>();
    assert_eq!(numbers, [1, 2]);
    assert_eq!(reloaded.org_nodes().len(), 1);
    assert_eq!(
        reloaded.org_nodes()[0].id, "n1",
        "n2 and its subtree are gone"
    );

    remove_dir_if_exists(&root);
}

fn node(
    id: &str,
    position_id: &str,
    position_name: &str,
    level: u32,
    parent_id: Option<&str>,
) -> OrgNode {
    OrgNode {
        id: id.to_owned(),
        position_id: position_id.to_owned(),
        position_name: position_name.to_owned(),
        level,
        parent_id: parent_id.map(str::to_owned),
        children: Vec::new(),
    }
}

fn position(id: &str, name: &str) -> Position {
    Position {
        id: id.to_owned(),
        name: name.to_owned(),
        code: name.chars().take(3).collect::<String>().to_uppercase(),
        name_thai: None,
        name_chinese: None,
        name_vietnamese: None,
        section: None,
        salary_type: None,
    }
}
