use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::error::{BrokerError, BrokerResult};

/// group -> topic -> partition -> next offset to consume.
type OffsetTable = BTreeMap<String, BTreeMap<String, BTreeMap<u32, u64>>>;

/// Committed consumer-group positions.
///
/// File-backed stores persist the whole table to `offsets.json` on every
/// commit, writing a temporary file and renaming it over the old one so a
/// crash never leaves a half-written table.
pub struct OffsetStore {
    path: Option<PathBuf>,
    table: Mutex<OffsetTable>,
}

impl OffsetStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            table: Mutex::new(OffsetTable::new()),
        }
    }

    /// Load `offsets.json` under `dir`, or start empty.
    pub fn open(dir: &Path) -> BrokerResult<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join("offsets.json");
        let table = if path.exists() {
            let bytes = fs::read(&path)?;
            serde_json::from_slice(&bytes).map_err(|e| BrokerError::Serialization(e.to_string()))?
        } else {
            OffsetTable::new()
        };
        Ok(Self {
            path: Some(path),
            table: Mutex::new(table),
        })
    }

    /// Committed position for a partition, if the group ever committed one.
    pub fn committed(&self, group: &str, topic: &str, partition: u32) -> Option<u64> {
        let table = self.table.lock().expect("offset lock poisoned");
        table
            .get(group)
            .and_then(|topics| topics.get(topic))
            .and_then(|partitions| partitions.get(&partition))
            .copied()
    }

    /// Record `next_offset` as the group's position for the partition.
    pub fn commit(&self, group: &str, topic: &str, partition: u32, next_offset: u64) -> BrokerResult<()> {
        let mut table = self.table.lock().expect("offset lock poisoned");
        table
            .entry(group.to_string())
            .or_default()
            .entry(topic.to_string())
            .or_default()
            .insert(partition, next_offset);

        if let Some(path) = &self.path {
            let encoded = serde_json::to_vec_pretty(&*table)
                .map_err(|e| BrokerError::Serialization(e.to_string()))?;
            let tmp = path.with_extension("json.tmp");
            fs::write(&tmp, encoded)?;
            fs::rename(&tmp, path)?;
        }
        debug!(group, topic, partition, next_offset, "offset committed");
        Ok(())
    }

    /// All committed positions of a group on a topic.
    pub fn group_offsets(&self, group: &str, topic: &str) -> BTreeMap<u32, u64> {
        let table = self.table.lock().expect("offset lock poisoned");
        table
            .get(group)
            .and_then(|topics| topics.get(topic))
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commits_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = OffsetStore::open(dir.path()).unwrap();
            assert_eq!(store.committed("g", "t", 0), None);
            store.commit("g", "t", 0, 5).unwrap();
            store.commit("g", "t", 2, 1).unwrap();
            store.commit("g", "t", 0, 6).unwrap();
        }
        let store = OffsetStore::open(dir.path()).unwrap();
        assert_eq!(store.committed("g", "t", 0), Some(6));
        assert_eq!(store.committed("g", "t", 2), Some(1));
        assert_eq!(store.committed("other", "t", 0), None);
        assert_eq!(store.group_offsets("g", "t").len(), 2);
        assert!(!dir.path().join("offsets.json.tmp").exists());
    }

    #[test]
    fn in_memory_store() {
        let store = OffsetStore::in_memory();
        store.commit("g", "t", 1, 3).unwrap();
        assert_eq!(store.committed("g", "t", 1), Some(3));
    }
}
