//! Reconciliation store for ptrack.
//!
//! The off-ledger system of record that read APIs query. Intake inserts a
//! `PENDING` row before publishing the creation event; after that only the
//! verification worker writes to a row, once a ledger outcome is known.
//!
//! Two backends implement [`ProductStore`]:
//! - [`InMemoryProductStore`] for tests and single-process development
//! - [`SqliteProductStore`] backed by a `products` table

pub mod config;
pub mod error;
pub mod memory;
pub mod sqlite;
pub mod traits;

pub use config::{open_store, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryProductStore;
pub use sqlite::SqliteProductStore;
pub use traits::{ProductStore, StatusUpdate};
