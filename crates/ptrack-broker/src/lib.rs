//! Durable, partitioned event log for ptrack.
//!
//! The broker carries creation events from the intake API to the
//! verification worker with the guarantees the pipeline relies on:
//!
//! - **Per-key ordering.** A key always maps to the same partition
//!   (`crc32(key) % partitions`) and a partition is an append-only log.
//! - **Durability.** Each partition is a segment file of
//!   `[len u32 LE][crc32 u32 LE][bincode payload]` frames; recovery skips
//!   corrupt frames and truncates a torn tail.
//! - **At-least-once delivery.** Consumers in a group resume from the group's
//!   committed offset, which only moves when the consumer calls `commit`.
//! - **Exclusive partitions.** Members of one group receive disjoint
//!   partition ranges.
//!
//! Without a `data_dir` the broker keeps the same semantics in memory.

pub mod broker;
pub mod config;
pub mod consumer;
pub mod error;
pub mod group;
pub mod message;
pub mod offsets;
pub mod partition;

pub use broker::{Broker, EventPublisher, Published};
pub use config::{BrokerConfig, SyncMode};
pub use consumer::{BrokerConsumer, EventConsumer};
pub use error::{BrokerError, BrokerResult};
pub use group::{range_assignment, GroupRegistry};
pub use message::{BrokerMessage, Delivery};
pub use offsets::OffsetStore;
pub use partition::{partition_for, PartitionLog};
