use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// One record in a partition log, as stored on disk.
///
/// The offset is part of the payload, so offsets stay stable when recovery
/// skips a corrupt frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerMessage {
    pub offset: u64,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// Append time, milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
}

impl BrokerMessage {
    pub fn timestamp(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.timestamp_ms)
            .single()
            .unwrap_or_default()
    }
}

/// A message handed to a consumer, with its coordinates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

impl Delivery {
    pub fn from_message(topic: &str, partition: u32, message: BrokerMessage) -> Self {
        let timestamp = message.timestamp();
        Self {
            topic: topic.to_string(),
            partition,
            offset: message.offset,
            key: message.key,
            value: message.value,
            timestamp,
        }
    }

    /// The key as text, lossily. Product ids are always UTF-8.
    pub fn key_str(&self) -> String {
        String::from_utf8_lossy(&self.key).into_owned()
    }
}
