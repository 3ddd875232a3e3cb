use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ptrack_types::TxId;

use crate::error::{LedgerError, LedgerResult};

/// Commit-time validation result of an ordered transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    /// The write set was applied to the world state.
    Valid,
    /// A key read during simulation changed before commit; nothing applied.
    MvccReadConflict,
}

impl ValidationCode {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid => write!(f, "VALID"),
            Self::MvccReadConflict => write!(f, "MVCC_READ_CONFLICT"),
        }
    }
}

/// One ordered transaction. Invalid transactions are logged too, with their
/// validation code, exactly like valid ones.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedTx {
    /// 1-based, gap-free position in the log.
    pub seq: u64,
    pub tx_id: TxId,
    pub function: String,
    pub args: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub validation: ValidationCode,
    pub prev_hash: Option<[u8; 32]>,
    pub tx_hash: [u8; 32],
}

/// Append-only, hash-linked transaction log.
///
/// Every entry commits to its predecessor's hash, so rewriting history
/// invalidates every later entry. Not internally synchronized; the ledger
/// network holds it behind its ordering lock.
#[derive(Debug, Default)]
pub struct TransactionLog {
    entries: Vec<CommittedTx>,
    by_tx: HashMap<TxId, usize>,
}

impl TransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transaction and return the sealed entry.
    pub fn append(
        &mut self,
        tx_id: TxId,
        function: &str,
        args: Vec<String>,
        timestamp: DateTime<Utc>,
        validation: ValidationCode,
    ) -> LedgerResult<CommittedTx> {
        let entry = self.seal(tx_id, function, args, timestamp, validation)?;
        self.push(entry.clone());
        Ok(entry)
    }

    /// Build the next entry, linked to the current head, without logging it.
    ///
    /// Every fallible check happens here; [`push`](Self::push) cannot fail.
    pub fn seal(
        &self,
        tx_id: TxId,
        function: &str,
        args: Vec<String>,
        timestamp: DateTime<Utc>,
        validation: ValidationCode,
    ) -> LedgerResult<CommittedTx> {
        if self.by_tx.contains_key(&tx_id) {
            return Err(LedgerError::DuplicateTransaction(tx_id.to_hex()));
        }

        let mut entry = CommittedTx {
            seq: self.entries.len() as u64 + 1,
            tx_id,
            function: function.to_string(),
            args,
            timestamp,
            validation,
            prev_hash: self.entries.last().map(|e| e.tx_hash),
            tx_hash: [0; 32],
        };
        entry.tx_hash = recompute_tx_hash(&entry)?;
        Ok(entry)
    }

    /// Log an entry produced by [`seal`](Self::seal) against the current head.
    pub fn push(&mut self, entry: CommittedTx) {
        self.by_tx.insert(entry.tx_id, self.entries.len());
        self.entries.push(entry);
    }

    /// The sequence number the next appended entry will receive.
    pub fn next_seq(&self) -> u64 {
        self.entries.len() as u64 + 1
    }

    pub fn get(&self, tx_id: &TxId) -> Option<&CommittedTx> {
        self.by_tx.get(tx_id).and_then(|&i| self.entries.get(i))
    }

    pub fn head(&self) -> Option<&CommittedTx> {
        self.entries.last()
    }

    pub fn entries(&self) -> &[CommittedTx] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Validate sequence numbering, hash links and entry hashes.
    pub fn validate(&self) -> LedgerResult<()> {
        for (index, entry) in self.entries.iter().enumerate() {
            let expected_seq = index as u64 + 1;
            if entry.seq != expected_seq {
                return Err(LedgerError::IntegrityViolation {
                    seq: entry.seq,
                    reason: format!("expected seq {expected_seq}, found {}", entry.seq),
                });
            }

            let expected_prev = if index == 0 {
                None
            } else {
                Some(self.entries[index - 1].tx_hash)
            };
            if entry.prev_hash != expected_prev {
                return Err(LedgerError::IntegrityViolation {
                    seq: entry.seq,
                    reason: "previous hash link mismatch".into(),
                });
            }

            if recompute_tx_hash(entry)? != entry.tx_hash {
                return Err(LedgerError::IntegrityViolation {
                    seq: entry.seq,
                    reason: "transaction hash mismatch".into(),
                });
            }
        }
        Ok(())
    }

    #[cfg(test)]
    fn entries_mut(&mut self) -> &mut Vec<CommittedTx> {
        &mut self.entries
    }
}

fn recompute_tx_hash(entry: &CommittedTx) -> LedgerResult<[u8; 32]> {
    let mut canonical = entry.clone();
    canonical.tx_hash = [0; 32];

    let encoded =
        serde_json::to_vec(&canonical).map_err(|e| LedgerError::Serialization(e.to_string()))?;

    let mut hasher = blake3::Hasher::new();
    hasher.update(b"ptrack-tx-v1:");
    hasher.update(&encoded);
    Ok(*hasher.finalize().as_bytes())
}
