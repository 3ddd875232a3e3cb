use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::id::{ProductId, TxId};

/// Lifecycle status of a product in the reconciliation store.
///
/// The ledger has no `PENDING` state: a product is `PENDING` only while the
/// relational row waits for the verification worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductStatus {
    Pending,
    Verified,
    Failed,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Verified => "VERIFIED",
            Self::Failed => "FAILED",
        }
    }

    /// Returns `true` for `VERIFIED` and `FAILED`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Whether a row in `self` may be rewritten to `next`.
    ///
    /// - `PENDING` may move to any status (a `PENDING → PENDING` write only
    ///   bumps the attempt counter).
    /// - A terminal status may be rewritten to itself (redelivery).
    /// - `FAILED → PENDING` is the single re-entry path for explicit retries.
    /// - `VERIFIED` is final.
    pub fn can_transition_to(&self, next: ProductStatus) -> bool {
        match (self, next) {
            (Self::Pending, _) => true,
            (current, next) if *current == next => true,
            (Self::Failed, Self::Pending) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductStatus {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "VERIFIED" => Ok(Self::Verified),
            "FAILED" => Ok(Self::Failed),
            other => Err(TypeError::UnknownStatus(other.to_string())),
        }
    }
}

/// Immutable descriptive data of a product, as submitted at intake.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductFields {
    pub name: String,
    #[serde(alias = "producer_id")]
    pub producer_id: String,
    #[serde(alias = "manufacture_date")]
    pub manufacture_date: String,
    /// Content fingerprint of the product's certificate or documents.
    #[serde(alias = "integrity_hash", alias = "certHash", alias = "cert_hash")]
    pub integrity_hash: String,
}

impl ProductFields {
    pub fn new(
        name: impl Into<String>,
        producer_id: impl Into<String>,
        manufacture_date: impl Into<String>,
        integrity_hash: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            producer_id: producer_id.into(),
            manufacture_date: manufacture_date.into(),
            integrity_hash: integrity_hash.into(),
        }
    }
}

/// A row in the relational system-of-record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    pub id: ProductId,
    #[serde(flatten)]
    pub fields: ProductFields,
    pub status: ProductStatus,
    /// Set only once the row reaches `VERIFIED`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_tx_id: Option<TxId>,
    /// Ledger submission attempts made so far.
    #[serde(default)]
    pub attempts: u32,
    /// Classification of the most recent failure, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Relational insertion time (not the ledger commit time).
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductRecord {
    /// A fresh `PENDING` row, as written by intake before the event is published.
    pub fn pending(id: ProductId, fields: ProductFields, now: DateTime<Utc>) -> Self {
        Self {
            id,
            fields,
            status: ProductStatus::Pending,
            ledger_tx_id: None,
            attempts: 0,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }
}
