use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ptrack_ledger::LedgerProduct;
use ptrack_types::{CreationEvent, ProductFields, ProductId, TxId};

use crate::error::GatewayResult;

/// The positional payload of a `CreateProduct` submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateRequest {
    pub id: ProductId,
    pub fields: ProductFields,
}

impl From<&CreationEvent> for CreateRequest {
    fn from(event: &CreationEvent) -> Self {
        Self {
            id: event.id.clone(),
            fields: event.fields.clone(),
        }
    }
}

/// Proof that a transaction reached finality and was applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitReceipt {
    pub tx_id: TxId,
    /// Position of the transaction in the ledger's log.
    pub seq: u64,
    pub committed_at: DateTime<Utc>,
}

/// Ledger façade used by the verification worker and the read API.
///
/// Every call is bounded in time; none can block forever.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Submit `CreateProduct` and wait for commit finality.
    async fn submit_create(&self, request: &CreateRequest) -> GatewayResult<CommitReceipt>;

    /// Evaluate `ReadProduct` against committed state.
    async fn read_product(&self, id: &ProductId) -> GatewayResult<LedgerProduct>;

    /// Evaluate `GetAllProducts` against committed state.
    async fn list_products(&self) -> GatewayResult<Vec<LedgerProduct>>;
}
