use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Maximum accepted length of a product identifier, in bytes.
pub const MAX_PRODUCT_ID_LEN: usize = 256;

/// Caller-supplied, globally unique product identifier.
///
/// The same string is the primary key of the relational row, the key of the
/// ledger world-state entry, and the partition key of the creation event.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProductId(String);

impl ProductId {
    /// Validate and wrap a product identifier.
    ///
    /// Rejects empty or whitespace-only ids, ids with control characters, and
    /// ids longer than [`MAX_PRODUCT_ID_LEN`].
    pub fn new(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(TypeError::InvalidProductId("id must not be empty".into()));
        }
        if id.len() > MAX_PRODUCT_ID_LEN {
            return Err(TypeError::InvalidProductId(format!(
                "id exceeds {MAX_PRODUCT_ID_LEN} bytes"
            )));
        }
        if id.chars().any(char::is_control) {
            return Err(TypeError::InvalidProductId(
                "id must not contain control characters".into(),
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The id as partition-key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProductId({})", self.0)
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ProductId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ProductId {
    type Error = TypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ProductId> for String {
    fn from(id: ProductId) -> Self {
        id.0
    }
}

/// Opaque reference to a committed ledger transaction.
///
/// A `TxId` is a BLAKE3 digest over the channel, contract and a per-call
/// nonce, rendered as lowercase hex. It is only ever set on a record once the
/// ledger has confirmed the transaction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxId([u8; 32]);

impl TxId {
    /// Derive a transaction id from the submission coordinates.
    pub fn derive(channel: &str, contract: &str, nonce: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"ptrack-tx-v1:");
        hasher.update(channel.as_bytes());
        hasher.update(b":");
        hasher.update(contract.as_bytes());
        hasher.update(b":");
        hasher.update(nonce);
        Self(*hasher.finalize().as_bytes())
    }

    /// Create a `TxId` from a pre-computed hash.
    pub fn from_hash(hash: [u8; 32]) -> Self {
        Self(hash)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(TypeError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({})", self.short_hex())
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for TxId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TxId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_id_rejects_blank() {
        assert!(ProductId::new("").is_err());
        assert!(ProductId::new("   ").is_err());
        assert!(ProductId::new("P1").is_ok());
    }

    #[test]
    fn product_id_rejects_control_chars() {
        assert!(ProductId::new("P\n1").is_err());
    }

    #[test]
    fn product_id_rejects_oversized() {
        let long = "x".repeat(MAX_PRODUCT_ID_LEN + 1);
        assert!(ProductId::new(long).is_err());
    }

    #[test]
    fn product_id_serializes_as_plain_string() {
        let id = ProductId::new("P1").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"P1\"");
        let bad: Result<ProductId, _> = serde_json::from_str("\"\"");
        assert!(bad.is_err());
    }

    #[test]
    fn tx_id_derivation_depends_on_nonce() {
        let a = TxId::derive("mychannel", "product_cc", b"n1");
        let b = TxId::derive("mychannel", "product_cc", b"n2");
        assert_ne!(a, b);
        assert_eq!(a, TxId::derive("mychannel", "product_cc", b"n1"));
    }

    #[test]
    fn tx_id_hex_and_json() {
        let tx = TxId::derive("c", "k", b"nonce");
        assert_eq!(TxId::from_hex(&tx.to_hex()).unwrap(), tx);
        let json = serde_json::to_string(&tx).unwrap();
        assert_eq!(json, format!("\"{}\"", tx.to_hex()));
        assert!(TxId::from_hex("abcd").is_err());
    }
}
