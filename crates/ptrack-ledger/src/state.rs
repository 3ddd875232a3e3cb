use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

use crate::error::ContractError;

/// Key-value world state the product contract runs against.
///
/// Keys are product ids; values are the JSON-encoded ledger records.
/// Implementations must make [`WorldState::put_if_absent`] atomic with respect
/// to other writers of the same key.
pub trait WorldState: Send + Sync {
    /// Read the current value for `key`. `Ok(None)` means absent.
    fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>, ContractError>;

    /// Store `value` under `key` only if the key is absent.
    ///
    /// Returns `false` (and leaves the state untouched) if the key exists.
    fn put_if_absent(&self, key: &str, value: Vec<u8>) -> Result<bool, ContractError>;

    /// Scan keys in `[start, end)` in key order. An empty `end` is unbounded.
    fn range(&self, start: &str, end: &str) -> Result<Vec<(String, Vec<u8>)>, ContractError>;
}

#[derive(Clone, Debug)]
struct Versioned {
    value: Vec<u8>,
    /// Log sequence of the transaction that wrote the value (0 = direct write).
    version: u64,
}

/// In-memory, `BTreeMap`-backed world state with per-key versions.
///
/// Storage order is key order, which is also the order `range` returns.
#[derive(Default)]
pub struct InMemoryWorldState {
    entries: RwLock<BTreeMap<String, Versioned>>,
}

impl InMemoryWorldState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Version of the value currently stored under `key`, if any.
    pub fn version(&self, key: &str) -> Result<Option<u64>, ContractError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(key).map(|v| v.version))
    }

    /// Apply a validated write set, stamping every key with `version`.
    pub fn apply_writes(
        &self,
        writes: &[(String, Vec<u8>)],
        version: u64,
    ) -> Result<(), ContractError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        for (key, value) in writes {
            entries.insert(
                key.clone(),
                Versioned {
                    value: value.clone(),
                    version,
                },
            );
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl WorldState for InMemoryWorldState {
    fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>, ContractError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(key).map(|v| v.value.clone()))
    }

    fn put_if_absent(&self, key: &str, value: Vec<u8>) -> Result<bool, ContractError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), Versioned { value, version: 0 });
        Ok(true)
    }

    fn range(&self, start: &str, end: &str) -> Result<Vec<(String, Vec<u8>)>, ContractError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        let upper = if end.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Excluded(end.to_string())
        };
        Ok(entries
            .range((Bound::Included(start.to_string()), upper))
            .map(|(k, v)| (k.clone(), v.value.clone()))
            .collect())
    }
}

impl std::fmt::Debug for InMemoryWorldState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryWorldState")
            .field("keys", &self.len())
            .finish()
    }
}

fn poisoned() -> ContractError {
    ContractError::WorldState("world state lock poisoned".into())
}
