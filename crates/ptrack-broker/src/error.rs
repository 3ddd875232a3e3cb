use std::io;

/// Errors produced by the broker.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("partition {partition} out of range for topic {topic} ({partitions} partitions)")]
    PartitionOutOfRange {
        topic: String,
        partition: u32,
        partitions: u32,
    },

    #[error("topic name {0:?} is not allowed")]
    InvalidTopic(String),

    /// A message was found that should never exist (e.g. out-of-order offsets).
    #[error("corrupt partition log {topic}/{partition}: {reason}")]
    Corrupt {
        topic: String,
        partition: u32,
        reason: String,
    },

    #[error("broker is shut down")]
    Shutdown,
}

/// Convenience alias used throughout the broker crate.
pub type BrokerResult<T> = std::result::Result<T, BrokerError>;
