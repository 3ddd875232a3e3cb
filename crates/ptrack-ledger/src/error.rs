use ptrack_types::ProductId;

/// Failures raised by the product contract itself.
///
/// `AlreadyExists`, `NotFound` and `InvalidArgument` are business rejections:
/// the ledger answered, and the answer is "no". The remaining variants are
/// infrastructure faults.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractError {
    #[error("the product {0} already exists")]
    AlreadyExists(ProductId),

    #[error("the product {0} does not exist")]
    NotFound(ProductId),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("failed to read from world state: {0}")]
    WorldState(String),
}

impl ContractError {
    /// Returns `true` when the contract deliberately refused the call.
    pub fn is_business_rejection(&self) -> bool {
        matches!(
            self,
            Self::AlreadyExists(_) | Self::NotFound(_) | Self::InvalidArgument(_)
        )
    }
}

/// Errors produced by ledger network and log operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("contract error: {0}")]
    Contract(#[from] ContractError),

    #[error("integrity violation at seq {seq}: {reason}")]
    IntegrityViolation { seq: u64, reason: String },

    #[error("transaction {0} was already submitted")]
    DuplicateTransaction(String),

    #[error("unknown transaction {0}")]
    UnknownTransaction(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("ledger lock poisoned")]
    LockPoisoned,
}

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
