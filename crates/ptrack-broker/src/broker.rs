use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::config::BrokerConfig;
use crate::consumer::BrokerConsumer;
use crate::error::{BrokerError, BrokerResult};
use crate::group::GroupRegistry;
use crate::message::BrokerMessage;
use crate::offsets::OffsetStore;
use crate::partition::{partition_for, PartitionLog};

/// Where a published message landed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Published {
    pub partition: u32,
    pub offset: u64,
}

/// Producer side of the broker.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Append `payload` to `topic`, partitioned by `key`.
    async fn publish(&self, topic: &str, key: &[u8], payload: &[u8]) -> BrokerResult<Published>;
}

struct Topic {
    partitions: Vec<PartitionLog>,
}

/// A set of partitioned topics plus consumer-group bookkeeping.
///
/// Topics are created on first use with `config.partitions` partitions; a
/// topic already on disk keeps the partition count it was created with.
pub struct Broker {
    config: BrokerConfig,
    topics: RwLock<HashMap<String, Arc<Topic>>>,
    offsets: OffsetStore,
    groups: Mutex<GroupRegistry>,
    appended: Notify,
}

impl Broker {
    /// Open a broker as configured: file-backed when `data_dir` is set.
    pub fn open(config: BrokerConfig) -> BrokerResult<Self> {
        let offsets = match &config.data_dir {
            Some(dir) => OffsetStore::open(dir)?,
            None => OffsetStore::in_memory(),
        };
        info!(
            data_dir = ?config.data_dir,
            partitions = config.partitions,
            "broker opened"
        );
        Ok(Self {
            config,
            topics: RwLock::new(HashMap::new()),
            offsets,
            groups: Mutex::new(GroupRegistry::new()),
            appended: Notify::new(),
        })
    }

    /// A broker that keeps everything in memory.
    pub fn in_memory(config: BrokerConfig) -> Self {
        Self {
            config: BrokerConfig {
                data_dir: None,
                ..config
            },
            topics: RwLock::new(HashMap::new()),
            offsets: OffsetStore::in_memory(),
            groups: Mutex::new(GroupRegistry::new()),
            appended: Notify::new(),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    fn topic(&self, name: &str) -> BrokerResult<Arc<Topic>> {
        if let Some(topic) = self.topics.read().expect("topic lock poisoned").get(name) {
            return Ok(topic.clone());
        }
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(BrokerError::InvalidTopic(name.to_string()));
        }

        let mut topics = self.topics.write().expect("topic lock poisoned");
        if let Some(topic) = topics.get(name) {
            return Ok(topic.clone());
        }

        let partitions = match &self.config.data_dir {
            Some(dir) => {
                let topic_dir = dir.join(name);
                let count = existing_partitions(&topic_dir)?.max(self.config.partitions.max(1));
                (0..count)
                    .map(|p| PartitionLog::open(&topic_dir.join(format!("{p}.log")), self.config.sync_mode))
                    .collect::<BrokerResult<Vec<_>>>()?
            }
            None => (0..self.config.partitions.max(1))
                .map(|_| PartitionLog::in_memory())
                .collect(),
        };
        debug!(topic = name, partitions = partitions.len(), "topic opened");

        let topic = Arc::new(Topic { partitions });
        topics.insert(name.to_string(), topic.clone());
        Ok(topic)
    }

    fn partition<'a>(&self, topic: &'a Topic, name: &str, partition: u32) -> BrokerResult<&'a PartitionLog> {
        topic
            .partitions
            .get(partition as usize)
            .ok_or_else(|| BrokerError::PartitionOutOfRange {
                topic: name.to_string(),
                partition,
                partitions: topic.partitions.len() as u32,
            })
    }

    pub fn partition_count(&self, topic: &str) -> BrokerResult<u32> {
        Ok(self.topic(topic)?.partitions.len() as u32)
    }

    /// Append a message to the partition `key` hashes to.
    pub fn append(&self, topic: &str, key: &[u8], value: &[u8]) -> BrokerResult<Published> {
        let handle = self.topic(topic)?;
        let partition = partition_for(key, handle.partitions.len() as u32);
        let offset = self.partition(&handle, topic, partition)?.append(key, value)?;
        self.appended.notify_waiters();
        debug!(topic, partition, offset, "message appended");
        Ok(Published { partition, offset })
    }

    /// Up to `max` messages of one partition starting at `offset`.
    pub fn fetch(&self, topic: &str, partition: u32, offset: u64, max: usize) -> BrokerResult<Vec<BrokerMessage>> {
        let handle = self.topic(topic)?;
        self.partition(&handle, topic, partition)?.read(offset, max)
    }

    /// Offset the next message appended to the partition will receive.
    pub fn end_offset(&self, topic: &str, partition: u32) -> BrokerResult<u64> {
        let handle = self.topic(topic)?;
        let log = self.partition(&handle, topic, partition)?;
        log.refresh()?;
        Ok(log.end_offset())
    }

    pub fn commit_offset(&self, group: &str, topic: &str, partition: u32, next_offset: u64) -> BrokerResult<()> {
        self.offsets.commit(group, topic, partition, next_offset)
    }

    pub fn committed_offset(&self, group: &str, topic: &str, partition: u32) -> Option<u64> {
        self.offsets.committed(group, topic, partition)
    }

    pub fn offsets(&self) -> &OffsetStore {
        &self.offsets
    }

    /// Join `group` on `topic` and return a consumer for the partitions the
    /// group assigns to it.
    pub fn subscribe(self: &Arc<Self>, topic: &str, group: &str) -> BrokerResult<BrokerConsumer> {
        self.topic(topic)?;
        let member = uuid::Uuid::now_v7().to_string();
        self.join_group(group, topic, &member);
        info!(topic, group, member = %member, "consumer joined group");
        Ok(BrokerConsumer::new(self.clone(), topic, group, member))
    }

    pub(crate) fn join_group(&self, group: &str, topic: &str, member: &str) -> u64 {
        self.groups
            .lock()
            .expect("group lock poisoned")
            .join(group, topic, member)
    }

    pub(crate) fn leave_group(&self, group: &str, topic: &str, member: &str) {
        self.groups
            .lock()
            .expect("group lock poisoned")
            .leave(group, topic, member);
    }

    /// Current generation and partition assignment of a group member.
    pub(crate) fn assignment(&self, group: &str, topic: &str, member: &str) -> BrokerResult<(u64, Vec<u32>)> {
        let partitions = self.partition_count(topic)?;
        let groups = self.groups.lock().expect("group lock poisoned");
        Ok((
            groups.generation(group, topic),
            groups.assignment(group, topic, member, partitions),
        ))
    }

    pub(crate) fn appended(&self) -> &Notify {
        &self.appended
    }

    pub fn data_dir(&self) -> Option<&PathBuf> {
        self.config.data_dir.as_ref()
    }
}

#[async_trait]
impl EventPublisher for Broker {
    async fn publish(&self, topic: &str, key: &[u8], payload: &[u8]) -> BrokerResult<Published> {
        self.append(topic, key, payload)
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("data_dir", &self.config.data_dir)
            .field("partitions", &self.config.partitions)
            .finish()
    }
}

/// Number of `<n>.log` files already present for a topic.
fn existing_partitions(topic_dir: &std::path::Path) -> BrokerResult<u32> {
    if !topic_dir.exists() {
        return Ok(0);
    }
    let mut count = 0;
    for entry in std::fs::read_dir(topic_dir)? {
        let name = entry?.file_name();
        let name = name.to_string_lossy();
        if let Some(stem) = name.strip_suffix(".log") {
            if let Ok(p) = stem.parse::<u32>() {
                count = count.max(p + 1);
            }
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_same_partition() {
        let broker = Broker::in_memory(BrokerConfig::default());
        let a = broker.append("t", b"P1", b"1").unwrap();
        let b = broker.append("t", b"P1", b"2").unwrap();
        assert_eq!(a.partition, b.partition);
        assert_eq!(b.offset, a.offset + 1);
        assert_eq!(broker.partition_count("t").unwrap(), 3);
    }

    #[test]
    fn fetch_out_of_range_partition() {
        let broker = Broker::in_memory(BrokerConfig::default());
        assert!(matches!(
            broker.fetch("t", 9, 0, 10),
            Err(BrokerError::PartitionOutOfRange { partition: 9, .. })
        ));
    }

    #[test]
    fn rejects_path_like_topic_names() {
        let broker = Broker::in_memory(BrokerConfig::default());
        assert!(matches!(
            broker.append("../etc", b"k", b"v"),
            Err(BrokerError::InvalidTopic(_))
        ));
    }

    #[test]
    fn durable_topic_keeps_partition_count_and_messages() {
        let dir = tempfile::tempdir().unwrap();
        let published = {
            let broker = Broker::open(BrokerConfig::durable(dir.path())).unwrap();
            broker.append("product.create", b"P1", b"hello").unwrap()
        };

        let config = BrokerConfig {
            partitions: 1,
            ..BrokerConfig::durable(dir.path())
        };
        let broker = Broker::open(config).unwrap();
        assert_eq!(broker.partition_count("product.create").unwrap(), 3);
        let messages = broker
            .fetch("product.create", published.partition, 0, 10)
            .unwrap();
        assert_eq!(messages[0].value, b"hello");
    }

    #[tokio::test]
    async fn publisher_trait_appends() {
        let broker = Broker::in_memory(BrokerConfig::default());
        let publisher: &dyn EventPublisher = &broker;
        let published = publisher.publish("t", b"k", b"v").await.unwrap();
        assert_eq!(broker.end_offset("t", published.partition).unwrap(), 1);
    }
}
