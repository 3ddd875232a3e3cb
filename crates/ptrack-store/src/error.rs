use ptrack_types::{ProductId, ProductStatus};

/// Errors from reconciliation store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A row with this id already exists.
    #[error("product {0} already exists")]
    Duplicate(ProductId),

    /// No row for this id. For status updates this is an integrity error:
    /// intake always writes the row before the event exists.
    #[error("product {0} not found")]
    NotFound(ProductId),

    /// The update would break status monotonicity.
    #[error("product {id}: transition {from} -> {to} not allowed")]
    InvalidTransition {
        id: ProductId,
        from: ProductStatus,
        to: ProductStatus,
    },

    /// The backend rejected or failed the operation.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The backend could not be reached (locked, missing, closed).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be decoded.
    #[error("corrupt row for {id}: {reason}")]
    CorruptRow { id: String, reason: String },
}

impl StoreError {
    /// Failures that say nothing about the data and may clear up on retry.
    pub fn is_outage(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::Unavailable(_))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
