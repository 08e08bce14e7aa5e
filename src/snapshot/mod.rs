use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::forest::{ForestStore, Level, OrgNode, Position};

pub mod autosave;

/// The single key under which the chart is persisted.
pub const STORAGE_KEY: &str = "orgChartData";

/// The flat persisted representation of the forest. Field names follow the
/// stored contract (`orgNodes`, `levelNumber`, `parentId`, ...), so existing
/// data keeps loading unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgChartSnapshot {
    #[serde(default)]
    pub positions: Vec<Position>,
    #[serde(default)]
    pub levels: Vec<Level>,
    #[serde(default)]
    pub org_nodes: Vec<OrgNode>,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to read stored value for `{key}`: {reason}")]
    ReadFailed { key: String, reason: String },

    #[error("failed to write stored value for `{key}`: {reason}")]
    WriteFailed { key: String, reason: String },
}

/// A flat string key/value backend, the only persistence contract the core
/// depends on.
pub trait SnapshotStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Stores each key as a JSON file under a root directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl SnapshotStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.key_path(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(StorageError::ReadFailed {
                key: key.to_owned(),
                reason: error.to_string(),
            }),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root).map_err(|error| StorageError::WriteFailed {
            key: key.to_owned(),
            reason: error.to_string(),
        })?;
        fs::write(self.key_path(key), value).map_err(|error| StorageError::WriteFailed {
            key: key.to_owned(),
            reason: error.to_string(),
        })
    }
}

/// In-memory backend for tests and headless use.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: BTreeMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

pub fn encode_snapshot(snapshot: &OrgChartSnapshot) -> Result<String> {
    serde_json::to_string_pretty(snapshot).context("failed to serialize org chart snapshot")
}

pub fn decode_snapshot(raw: &str) -> Result<OrgChartSnapshot> {
    serde_json::from_str(raw).context("failed to parse org chart snapshot")
}

/// The fixed fallback dataset: a handful of starter positions, one empty
/// level, no nodes.
pub fn default_seed() -> OrgChartSnapshot {
    let position = |id: &str, name: &str, code: &str| Position {
        id: id.to_owned(),
        name: name.to_owned(),
        code: code.to_owned(),
        name_thai: None,
        name_chinese: None,
        name_vietnamese: None,
        section: None,
        salary_type: None,
    };

    OrgChartSnapshot {
        positions: vec![
            position("1", "CEO", "CEO-001"),
            position("2", "IT Support", "IT-001"),
            position("3", "IT 01", "IT-002"),
            position("4", "IT 02", "IT-003"),
            position("5", "Financer", "FIN-001"),
        ],
        levels: vec![Level {
            level_number: 1,
            nodes: Vec::new(),
        }],
        org_nodes: Vec::new(),
    }
}

/// Loads the stored chart, falling back to the default seed when the stored
/// value is absent, unreadable, or corrupt. Corrupt data never propagates an
/// error to the caller; the parse failure is logged and the seed takes over.
pub fn load_or_default(storage: &impl SnapshotStorage) -> ForestStore {
    let snapshot = match storage.get(STORAGE_KEY) {
        Ok(Some(raw)) => match decode_snapshot(&raw) {
            Ok(snapshot) => snapshot,
            Err(error) => {
                warn!(
                    key = STORAGE_KEY,
                    error = %error,
                    "stored org chart is corrupt; falling back to the default seed"
                );
                default_seed()
            }
        },
        Ok(None) => default_seed(),
        Err(error) => {
            warn!(
                key = STORAGE_KEY,
                error = %error,
                "failed to read stored org chart; falling back to the default seed"
            );
            default_seed()
        }
    };

    ForestStore::from_snapshot(snapshot)
}

/// Full snapshot overwrite of the single storage key; no merge semantics.
pub fn save_to_storage(storage: &mut impl SnapshotStorage, store: &ForestStore) -> Result<()> {
    let raw = encode_snapshot(&store.snapshot())?;
    storage
        .set(STORAGE_KEY, &raw)
        .context("failed to persist org chart snapshot")
}

#[cfg(test)]
mod tests {
    use crate::forest::{ForestStore, OrgNode};
    use crate::test_support::{remove_dir_if_exists, temp_path};

    use super::{
        FileStorage, MemoryStorage, STORAGE_KEY, SnapshotStorage, decode_snapshot, default_seed,
        encode_snapshot, load_or_default, save_to_storage,
    };

    #[test]
    fn snapshot_round_trips_through_the_codec() {
        let mut store = ForestStore::from_snapshot(default_seed());
        store.add_level();
        store.add_node(node("n1", 1, None));
        store.add_node(node("n2", 2, Some("n1")));

        let raw = encode_snapshot(&store.snapshot()).expect("snapshot should serialize");
        let decoded = decode_snapshot(&raw).expect("snapshot should parse");
        assert_eq!(decoded, store.snapshot());
    }

    #[test]
    fn serialized_snapshot_uses_the_stored_contract_keys() {
        let mut store = ForestStore::from_snapshot(default_seed());
        store.add_node(node("n1", 1, None));

        let raw = encode_snapshot(&store.snapshot()).expect("snapshot should serialize");
        let value = serde_json::from_str::<serde_json::Value>(&raw)
            .expect("serialized snapshot should be JSON");

        assert!(value.get("orgNodes").is_some());
        assert!(value.get("positions").is_some());
        let level = &value["levels"][0];
        assert!(level.get("levelNumber").is_some());
        let stored_node = &value["orgNodes"][0];
        assert!(stored_node.get("positionId").is_some());
        assert!(stored_node.get("positionName").is_some());
        assert!(stored_node.get("parentId").is_some());
    }

    #[test]
    fn load_falls_back_to_the_seed_when_nothing_is_stored() {
        let storage = MemoryStorage::new();
        let store = load_or_default(&storage);

        assert_eq!(store.positions().len(), 5);
        assert_eq!(store.positions()[0].name, "CEO");
        assert_eq!(store.levels().len(), 1);
        assert!(store.org_nodes().is_empty());
    }

    #[test]
    fn load_falls_back_to_the_seed_on_corrupt_data() {
        let mut storage = MemoryStorage::new();
        storage
            .set(STORAGE_KEY, "{not valid json")
            .expect("memory set should succeed");

        let store = load_or_default(&storage);
        assert_eq!(store.positions().len(), 5);
        assert!(store.org_nodes().is_empty());
    }

    #[test]
    fn save_then_load_reproduces_the_forest_through_memory_storage() {
        let mut storage = MemoryStorage::new();
        let mut store = ForestStore::from_snapshot(default_seed());
        store.add_level();
        store.add_node(node("n1", 1, None));
        store.add_node(node("n2", 2, Some("n1")));

        save_to_storage(&mut storage, &store).expect("save should succeed");
        let reloaded = load_or_default(&storage);

        assert_eq!(reloaded.snapshot(), store.snapshot());
    }

    #[test]
    fn file_storage_persists_across_instances() {
        let root = temp_path("snapshot-file-storage");
        let mut storage = FileStorage::new(&root);
        let mut store = ForestStore::from_snapshot(default_seed());
        store.add_node(node("n1", 1, None));

        save_to_storage(&mut storage, &store).expect("save should succeed");

        let fresh = FileStorage::new(&root);
        let reloaded = load_or_default(&fresh);
        assert_eq!(reloaded.snapshot(), store.snapshot());

        remove_dir_if_exists(&root);
    }

    #[test]
    fn file_storage_reports_missing_keys_as_absent() {
        let root = temp_path("snapshot-missing-key");
        let storage = FileStorage::new(&root);
        let stored = storage.get(STORAGE_KEY).expect("get should succeed");
        assert!(stored.is_none());
    }

    fn node(id: &str, level: u32, parent_id: Option<&str>) -> OrgNode {
        OrgNode {
            id: id.to_owned(),
            position_id: format!("pos-{id}"),
            position_name: id.to_owned(),
            level,
            parent_id: parent_id.map(str::to_owned),
            children: Vec::new(),
        }
    }
}
