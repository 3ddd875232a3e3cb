use ptrack_broker::BrokerError;
use ptrack_store::StoreError;
use ptrack_types::{ProductId, ProductStatus, TypeError};

/// Errors that stop the worker from finishing an event.
///
/// Any of these leaves the consumer position uncommitted, so the event is
/// delivered again.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl WorkerError {
    /// The relational store could not be reached.
    pub fn is_store_outage(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_outage())
    }
}

/// Errors returned to intake callers.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("product {0} already exists")]
    Duplicate(ProductId),

    #[error("product {0} not found")]
    NotFound(ProductId),

    #[error("product {id} is {status} and cannot be requeued")]
    NotRetryable { id: ProductId, status: ProductStatus },

    #[error("store error: {0}")]
    Store(StoreError),

    /// The row was written but the event could not be queued.
    #[error("failed to queue creation event for {id}: {source}")]
    Publish {
        id: ProductId,
        #[source]
        source: BrokerError,
    },

    #[error("encoding error: {0}")]
    Encoding(#[from] TypeError),
}

impl From<StoreError> for IntakeError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(id) => Self::Duplicate(id),
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::InvalidTransition { id, from, .. } => Self::NotRetryable { id, status: from },
            other => Self::Store(other),
        }
    }
}

/// Result alias for worker operations.
pub type WorkerResult<T> = Result<T, WorkerError>;
