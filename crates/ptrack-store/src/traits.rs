use chrono::{DateTime, Utc};

use ptrack_types::{ProductFields, ProductId, ProductRecord, ProductStatus, TxId};

use crate::error::{StoreError, StoreResult};

/// A status write produced by the verification worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: ProductStatus,
    pub ledger_tx_id: Option<TxId>,
    pub failure_reason: Option<String>,
}

impl StatusUpdate {
    pub fn verified(tx_id: TxId) -> Self {
        Self {
            status: ProductStatus::Verified,
            ledger_tx_id: Some(tx_id),
            failure_reason: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: ProductStatus::Failed,
            ledger_tx_id: None,
            failure_reason: Some(reason.into()),
        }
    }

    /// Re-enter `PENDING` for an explicit retry of a failed row.
    pub fn retry() -> Self {
        Self {
            status: ProductStatus::Pending,
            ledger_tx_id: None,
            failure_reason: None,
        }
    }

    /// Apply this update to `record`, enforcing the status transition rules.
    ///
    /// Re-entering `PENDING` from `FAILED` resets the attempt counter.
    pub fn apply_to(&self, record: &mut ProductRecord, now: DateTime<Utc>) -> StoreResult<()> {
        if !record.status.can_transition_to(self.status) {
            return Err(StoreError::InvalidTransition {
                id: record.id.clone(),
                from: record.status,
                to: self.status,
            });
        }
        if record.status == ProductStatus::Failed && self.status == ProductStatus::Pending {
            record.attempts = 0;
        }
        record.status = self.status;
        record.ledger_tx_id = self.ledger_tx_id;
        record.failure_reason = self.failure_reason.clone();
        record.updated_at = now;
        Ok(())
    }
}

/// The relational system of record for products.
///
/// Implementations must:
/// - keep exactly one row per id (`insert_pending` refuses duplicates)
/// - refuse status updates that break monotonicity (see
///   [`ProductStatus::can_transition_to`])
/// - report an update of a missing row as [`StoreError::NotFound`], never
///   as a silent no-op
pub trait ProductStore: Send + Sync {
    /// Insert a new `PENDING` row.
    fn insert_pending(&self, id: &ProductId, fields: &ProductFields) -> StoreResult<ProductRecord>;

    /// Persist one more ledger submission attempt and return the updated row.
    fn record_attempt(&self, id: &ProductId) -> StoreResult<ProductRecord>;

    /// Write a ledger outcome: `UPDATE products SET status, ledger_tx_id WHERE id`.
    fn apply_outcome(&self, id: &ProductId, update: &StatusUpdate) -> StoreResult<ProductRecord>;

    fn get(&self, id: &ProductId) -> StoreResult<Option<ProductRecord>>;

    /// Every row, most recently created first.
    fn list_recent(&self) -> StoreResult<Vec<ProductRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ProductRecord {
        ProductRecord::pending(
            ProductId::new("P1").unwrap(),
            ProductFields::new("n", "p", "d", "h"),
            Utc::now(),
        )
    }

    #[test]
    fn verified_then_failed_is_refused() {
        let mut r = record();
        let tx = TxId::derive("c", "k", b"1");
        StatusUpdate::verified(tx).apply_to(&mut r, Utc::now()).unwrap();
        assert_eq!(r.ledger_tx_id, Some(tx));

        let err = StatusUpdate::failed("duplicate")
            .apply_to(&mut r, Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidTransition {
                from: ProductStatus::Verified,
                to: ProductStatus::Failed,
                ..
            }
        ));
        assert_eq!(r.status, ProductStatus::Verified);
    }

    #[test]
    fn retry_resets_attempts() {
        let mut r = record();
        r.attempts = 3;
        StatusUpdate::failed("transport: timeout")
            .apply_to(&mut r, Utc::now())
            .unwrap();
        StatusUpdate::retry().apply_to(&mut r, Utc::now()).unwrap();
        assert_eq!(r.status, ProductStatus::Pending);
        assert_eq!(r.attempts, 0);
        assert_eq!(r.failure_reason, None);
    }
}
