use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Flush strategy for partition segment files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` after every append.
    EveryWrite,
    /// Flush to the OS page cache only.
    #[default]
    OsDefault,
}

/// Broker settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Directory holding topic segment files and `offsets.json`.
    /// `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    /// Partition count for newly created topics.
    pub partitions: u32,
    pub sync_mode: SyncMode,
    /// Topic carrying product-creation events.
    pub topic: String,
    pub consumer_group: String,
    /// How often an idle consumer re-checks the log for appends made by
    /// another process.
    pub poll_interval_ms: u64,
    pub max_poll_records: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            partitions: 3,
            sync_mode: SyncMode::default(),
            topic: "product.create".into(),
            consumer_group: "worker-group".into(),
            poll_interval_ms: 200,
            max_poll_records: 64,
        }
    }
}

impl BrokerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Defaults with files under `dir`.
    pub fn durable(dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(dir.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_pipeline_names() {
        let c = BrokerConfig::default();
        assert_eq!(c.topic, "product.create");
        assert_eq!(c.consumer_group, "worker-group");
        assert_eq!(c.partitions, 3);
        assert!(c.data_dir.is_none());
    }

    #[test]
    fn sync_mode_is_snake_case() {
        let c: BrokerConfig = serde_json::from_str(r#"{"sync_mode": "every_write"}"#).unwrap();
        assert_eq!(c.sync_mode, SyncMode::EveryWrite);
        assert_eq!(c.partitions, 3);
    }
}
