use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::memory::InMemoryProductStore;
use crate::sqlite::SqliteProductStore;
use crate::traits::ProductStore;

/// Which reconciliation store backend to use.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreConfig {
    Memory,
    Sqlite { path: PathBuf },
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("data/ptrack.db"),
        }
    }
}

/// Open the configured backend.
pub fn open_store(config: &StoreConfig) -> StoreResult<Arc<dyn ProductStore>> {
    Ok(match config {
        StoreConfig::Memory => Arc::new(InMemoryProductStore::new()),
        StoreConfig::Sqlite { path } => Arc::new(SqliteProductStore::open(path)?),
    })
}
