use thiserror::Error;

/// Errors produced by type construction and decoding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid product id: {0}")]
    InvalidProductId(String),

    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("unknown product status: {0}")]
    UnknownStatus(String),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("malformed event: {0}")]
    MalformedEvent(String),
}
