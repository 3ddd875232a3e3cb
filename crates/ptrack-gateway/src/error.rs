use std::fmt;
use std::time::Duration;

use ptrack_ledger::ValidationCode;

/// Errors reported by a [`LedgerPeer`](crate::LedgerPeer) implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PeerError {
    /// The contract refused the proposal during endorsement.
    #[error("chaincode rejected the proposal: {0}")]
    ChaincodeRejected(String),

    #[error("peer unavailable: {0}")]
    Unavailable(String),

    #[error("endorsement failed: {0}")]
    EndorsementFailed(String),

    #[error("ordering service refused the transaction: {0}")]
    OrderingFailed(String),

    #[error("unknown transaction {0}")]
    UnknownTransaction(String),
}

/// What kind of business rule the ledger reported as violated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RejectionKind {
    /// A product with this id is already on the ledger.
    Duplicate,
    NotFound,
    /// Anything else the contract refused (bad arguments, unknown function).
    Invalid,
}

impl RejectionKind {
    /// Classify a contract error message.
    pub fn classify(message: &str) -> Self {
        if message.contains("already exists") {
            Self::Duplicate
        } else if message.contains("does not exist") {
            Self::NotFound
        } else {
            Self::Invalid
        }
    }
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duplicate => write!(f, "duplicate"),
            Self::NotFound => write!(f, "not found"),
            Self::Invalid => write!(f, "invalid"),
        }
    }
}

/// A call that never got a definitive answer from the ledger.
///
/// These are plausibly transient: retrying the same submission may succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportFailure {
    #[error("connect timeout after {0:?}")]
    ConnectTimeout(Duration),

    #[error("peer unavailable: {0}")]
    Unavailable(String),

    #[error("endorse timeout after {0:?}")]
    EndorseTimeout(Duration),

    #[error("endorsement failed: {0}")]
    EndorsementFailed(String),

    #[error("submit timeout after {0:?}")]
    SubmitTimeout(Duration),

    #[error("ordering failed: {0}")]
    OrderingFailed(String),

    #[error("commit status timeout after {0:?}")]
    CommitStatusTimeout(Duration),

    /// The transaction was ordered but invalidated at commit (e.g. a racing
    /// write to the same key). Nothing was applied.
    #[error("transaction invalidated at commit: {0}")]
    CommitInvalid(ValidationCode),

    #[error("evaluate timeout after {0:?}")]
    EvaluateTimeout(Duration),

    #[error("malformed ledger response: {0}")]
    MalformedResponse(String),
}

/// Errors produced by [`Gateway`](crate::Gateway) calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The ledger actively refused the call. Retrying will not help.
    #[error("ledger rejected the call ({kind}): {message}")]
    Rejected { kind: RejectionKind, message: String },

    #[error("transport failure: {0}")]
    Transport(#[from] TransportFailure),
}

impl GatewayError {
    pub fn rejected(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::Rejected {
            kind: RejectionKind::classify(&message),
            message,
        }
    }

    pub fn is_business_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            Self::Rejected {
                kind: RejectionKind::Duplicate,
                ..
            }
        )
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Short, stable description suitable for the store's `failure_reason`.
    pub fn classification(&self) -> String {
        match self {
            Self::Rejected { kind, .. } => kind.to_string(),
            Self::Transport(failure) => format!("transport: {failure}"),
        }
    }
}

/// Result alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
