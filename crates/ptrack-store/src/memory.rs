use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;

use ptrack_types::{ProductFields, ProductId, ProductRecord};

use crate::error::{StoreError, StoreResult};
use crate::traits::{ProductStore, StatusUpdate};

#[derive(Default)]
struct Table {
    rows: HashMap<ProductId, (u64, ProductRecord)>,
    next_seq: u64,
}

/// In-memory product table using a `HashMap` behind a `RwLock`.
///
/// Suitable for tests and single-process development. All data is lost when
/// the store is dropped.
#[derive(Default)]
pub struct InMemoryProductStore {
    table: RwLock<Table>,
}

impl InMemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.table.read().expect("lock poisoned").rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ProductStore for InMemoryProductStore {
    fn insert_pending(&self, id: &ProductId, fields: &ProductFields) -> StoreResult<ProductRecord> {
        let mut table = self.table.write().expect("lock poisoned");
        if table.rows.contains_key(id) {
            return Err(StoreError::Duplicate(id.clone()));
        }
        let record = ProductRecord::pending(id.clone(), fields.clone(), Utc::now());
        let seq = table.next_seq;
        table.next_seq += 1;
        table.rows.insert(id.clone(), (seq, record.clone()));
        Ok(record)
    }

    fn record_attempt(&self, id: &ProductId) -> StoreResult<ProductRecord> {
        let mut table = self.table.write().expect("lock poisoned");
        let (_, record) = table
            .rows
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        record.attempts += 1;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    fn apply_outcome(&self, id: &ProductId, update: &StatusUpdate) -> StoreResult<ProductRecord> {
        let mut table = self.table.write().expect("lock poisoned");
        let (_, record) = table
            .rows
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        update.apply_to(record, Utc::now())?;
        Ok(record.clone())
    }

    fn get(&self, id: &ProductId) -> StoreResult<Option<ProductRecord>> {
        let table = self.table.read().expect("lock poisoned");
        Ok(table.rows.get(id).map(|(_, r)| r.clone()))
    }

    fn list_recent(&self) -> StoreResult<Vec<ProductRecord>> {
        let table = self.table.read().expect("lock poisoned");
        let mut rows: Vec<&(u64, ProductRecord)> = table.rows.values().collect();
        rows.sort_by(|(sa, a), (sb, b)| b.created_at.cmp(&a.created_at).then(sb.cmp(sa)));
        Ok(rows.into_iter().map(|(_, r)| r.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ptrack_types::{ProductStatus, TxId};

    fn pid(s: &str) -> ProductId {
        ProductId::new(s).unwrap()
    }

    fn fields() -> ProductFields {
        ProductFields::new("Coffee", "F1", "2024-01-01", "h1")
    }

    #[test]
    fn insert_get_and_duplicate() {
        let store = InMemoryProductStore::new();
        let row = store.insert_pending(&pid("P1"), &fields()).unwrap();
        assert_eq!(row.status, ProductStatus::Pending);
        assert_eq!(store.get(&pid("P1")).unwrap(), Some(row));
        assert!(matches!(
            store.insert_pending(&pid("P1"), &fields()),
            Err(StoreError::Duplicate(_))
        ));
        assert_eq!(store.get(&pid("P2")).unwrap(), None);
    }

    #[test]
    fn update_of_missing_row_is_an_error() {
        let store = InMemoryProductStore::new();
        let tx = TxId::derive("c", "k", b"1");
        assert!(matches!(
            store.apply_outcome(&pid("ghost"), &StatusUpdate::verified(tx)),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.record_attempt(&pid("ghost")),
            Err(StoreError::NotFound(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn attempts_and_outcome() {
        let store = InMemoryProductStore::new();
        store.insert_pending(&pid("P1"), &fields()).unwrap();
        assert_eq!(store.record_attempt(&pid("P1")).unwrap().attempts, 1);
        assert_eq!(store.record_attempt(&pid("P1")).unwrap().attempts, 2);

        let tx = TxId::derive("c", "k", b"1");
        let row = store
            .apply_outcome(&pid("P1"), &StatusUpdate::verified(tx))
            .unwrap();
        assert_eq!(row.status, ProductStatus::Verified);
        assert_eq!(row.ledger_tx_id, Some(tx));
        assert_eq!(row.attempts, 2);

        // Rewriting the same terminal values is idempotent.
        store
            .apply_outcome(&pid("P1"), &StatusUpdate::verified(tx))
            .unwrap();
    }

    #[test]
    fn list_is_most_recent_first() {
        let store = InMemoryProductStore::new();
        for id in ["A", "B", "C"] {
            store.insert_pending(&pid(id), &fields()).unwrap();
        }
        let ids: Vec<String> = store
            .list_recent()
            .unwrap()
            .into_iter()
            .map(|r| r.id.to_string())
            .collect();
        assert_eq!(ids, vec!["C", "B", "A"]);
    }
}
