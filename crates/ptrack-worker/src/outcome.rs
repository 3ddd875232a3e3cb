use serde::Serialize;

use ptrack_gateway::{CommitReceipt, RejectionKind};
use ptrack_store::StatusUpdate;
use ptrack_types::{ProductId, ProductRecord, ProductStatus, TxId};

/// How a ledger submission ended, as observed by the worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The transaction reached finality and was applied.
    Committed(CommitReceipt),
    /// The ledger refused a duplicate, but already holds exactly this record:
    /// an earlier delivery committed it.
    Recovered { tx_id: TxId },
    /// The ledger refused the call. Never retried.
    Rejected { kind: RejectionKind, reason: String },
    /// No definitive answer after the retry budget was spent.
    TransportFailed { reason: String, attempts: u32 },
}

impl Outcome {
    /// The store write this outcome maps to.
    pub fn status_update(&self) -> StatusUpdate {
        match self {
            Self::Committed(receipt) => StatusUpdate::verified(receipt.tx_id),
            Self::Recovered { tx_id } => StatusUpdate::verified(*tx_id),
            Self::Rejected { reason, .. } => StatusUpdate::failed(reason.clone()),
            Self::TransportFailed { reason, .. } => StatusUpdate::failed(reason.clone()),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Committed(_) => "committed",
            Self::Recovered { .. } => "recovered",
            Self::Rejected { .. } => "rejected",
            Self::TransportFailed { .. } => "transport_failed",
        }
    }
}

/// What the worker did with one delivery. Every variant commits the
/// consumer position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// The outcome was written to the store.
    Reconciled {
        outcome: Outcome,
        record: ProductRecord,
    },
    /// The store already holds a state the outcome may not overwrite
    /// (e.g. `VERIFIED` receiving `FAILED` for a duplicate event).
    AlreadyReconciled {
        id: ProductId,
        outcome: Option<Outcome>,
        current: ProductStatus,
    },
    /// The payload could not be decoded; nothing was touched.
    Dropped { reason: String },
    /// No relational row exists for the event. Intake always writes the row
    /// first, so this is an integrity error; nothing was submitted.
    Orphaned { id: ProductId },
}

impl Disposition {
    pub fn product_id(&self) -> Option<&ProductId> {
        match self {
            Self::Reconciled { record, .. } => Some(&record.id),
            Self::AlreadyReconciled { id, .. } | Self::Orphaned { id } => Some(id),
            Self::Dropped { .. } => None,
        }
    }
}

/// Payload published to the dead-letter topic.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter<'a> {
    pub product_id: &'a ProductId,
    pub reason: &'a str,
    pub attempts: u32,
    pub source_topic: &'a str,
    pub source_partition: u32,
    pub source_offset: u64,
    pub event: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn outcomes_map_to_status_updates() {
        let tx = TxId::derive("c", "k", b"1");
        let committed = Outcome::Committed(CommitReceipt {
            tx_id: tx,
            seq: 1,
            committed_at: Utc::now(),
        });
        assert_eq!(committed.status_update(), StatusUpdate::verified(tx));
        assert_eq!(
            Outcome::Recovered { tx_id: tx }.status_update(),
            StatusUpdate::verified(tx)
        );

        let rejected = Outcome::Rejected {
            kind: RejectionKind::Duplicate,
            reason: "duplicate".into(),
        };
        assert_eq!(rejected.status_update(), StatusUpdate::failed("duplicate"));
        assert_eq!(rejected.label(), "rejected");
    }
}
