use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use ptrack_types::{ProductId, TxId};

use crate::contract::{ContractCall, LedgerProduct, ProductContract, TxContext};
use crate::error::{ContractError, LedgerError, LedgerResult};
use crate::log::{CommittedTx, TransactionLog, ValidationCode};
use crate::state::{InMemoryWorldState, WorldState};

/// A signed-off request to run one contract call as a transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proposal {
    pub tx_id: TxId,
    pub timestamp: DateTime<Utc>,
    pub call: ContractCall,
}

impl Proposal {
    pub fn new(tx_id: TxId, timestamp: DateTime<Utc>, call: ContractCall) -> Self {
        Self {
            tx_id,
            timestamp,
            call,
        }
    }
}

/// Keys observed (with the version seen) and writes buffered during simulation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReadWriteSet {
    pub reads: Vec<(String, Option<u64>)>,
    pub writes: Vec<(String, Vec<u8>)>,
}

/// Result of simulating a proposal: the read/write set plus the contract's
/// response. Nothing is applied until the endorsement is ordered and validated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endorsement {
    pub proposal: Proposal,
    pub rw_set: ReadWriteSet,
    pub response: Vec<u8>,
}

/// Finality report for an ordered transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitStatus {
    pub tx_id: TxId,
    pub seq: u64,
    pub validation: ValidationCode,
    pub timestamp: DateTime<Utc>,
}

impl From<&CommittedTx> for CommitStatus {
    fn from(tx: &CommittedTx) -> Self {
        Self {
            tx_id: tx.tx_id,
            seq: tx.seq,
            validation: tx.validation,
            timestamp: tx.timestamp,
        }
    }
}

/// World-state view used while endorsing: reads go through to the committed
/// state and are recorded with their version, writes are buffered.
struct Simulation<'a> {
    base: &'a InMemoryWorldState,
    rw_set: Mutex<ReadWriteSet>,
}

impl<'a> Simulation<'a> {
    fn new(base: &'a InMemoryWorldState) -> Self {
        Self {
            base,
            rw_set: Mutex::new(ReadWriteSet::default()),
        }
    }

    fn into_rw_set(self) -> Result<ReadWriteSet, ContractError> {
        self.rw_set.into_inner().map_err(|_| sim_poisoned())
    }

    fn record_read(&self, rw: &mut ReadWriteSet, key: &str) -> Result<(), ContractError> {
        if !rw.reads.iter().any(|(k, _)| k == key) {
            rw.reads.push((key.to_string(), self.base.version(key)?));
        }
        Ok(())
    }
}

impl WorldState for Simulation<'_> {
    fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>, ContractError> {
        let mut rw = self.rw_set.lock().map_err(|_| sim_poisoned())?;
        if let Some((_, value)) = rw.writes.iter().find(|(k, _)| k == key) {
            return Ok(Some(value.clone()));
        }
        self.record_read(&mut rw, key)?;
        self.base.get_state(key)
    }

    fn put_if_absent(&self, key: &str, value: Vec<u8>) -> Result<bool, ContractError> {
        if self.get_state(key)?.is_some() {
            return Ok(false);
        }
        let mut rw = self.rw_set.lock().map_err(|_| sim_poisoned())?;
        rw.writes.push((key.to_string(), value));
        Ok(true)
    }

    fn range(&self, start: &str, end: &str) -> Result<Vec<(String, Vec<u8>)>, ContractError> {
        let mut rw = self.rw_set.lock().map_err(|_| sim_poisoned())?;
        let mut merged: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        for (key, value) in self.base.range(start, end)? {
            self.record_read(&mut rw, &key)?;
            merged.insert(key, value);
        }
        for (key, value) in &rw.writes {
            if key.as_str() >= start && (end.is_empty() || key.as_str() < end) {
                merged.insert(key.clone(), value.clone());
            }
        }
        Ok(merged.into_iter().collect())
    }
}

fn sim_poisoned() -> ContractError {
    ContractError::WorldState("simulation lock poisoned".into())
}

/// An in-process ledger network: one peer's world state, one ordering
/// service and one hash-linked log.
///
/// Transactions go through three phases:
/// 1. [`LedgerNetwork::endorse`] simulates the call and captures a read/write set.
/// 2. [`LedgerNetwork::submit`] orders the endorsement under a single lock,
///    re-validates every read version, and applies the writes only if none
///    changed (MVCC). The transaction is logged either way.
/// 3. [`LedgerNetwork::commit_status`] reports finality for a transaction id.
pub struct LedgerNetwork {
    channel: String,
    contract_name: String,
    contract: ProductContract,
    state: InMemoryWorldState,
    ordering: Mutex<TransactionLog>,
}

impl LedgerNetwork {
    pub fn new(channel: impl Into<String>, contract_name: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            contract_name: contract_name.into(),
            contract: ProductContract,
            state: InMemoryWorldState::new(),
            ordering: Mutex::new(TransactionLog::new()),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn contract_name(&self) -> &str {
        &self.contract_name
    }

    /// Simulate a proposal without touching committed state.
    ///
    /// A contract refusal (e.g. duplicate id) surfaces here as
    /// [`LedgerError::Contract`] and the transaction is never ordered.
    pub fn endorse(&self, proposal: Proposal) -> LedgerResult<Endorsement> {
        let ctx = TxContext {
            tx_id: proposal.tx_id,
            timestamp: proposal.timestamp,
        };
        let simulation = Simulation::new(&self.state);
        let response = self.contract.invoke(&simulation, &ctx, &proposal.call)?;
        let rw_set = simulation.into_rw_set()?;

        debug!(
            tx_id = %proposal.tx_id.short_hex(),
            function = proposal.call.function(),
            reads = rw_set.reads.len(),
            writes = rw_set.writes.len(),
            "proposal endorsed"
        );
        Ok(Endorsement {
            proposal,
            rw_set,
            response,
        })
    }

    /// Order, validate and commit an endorsed transaction.
    pub fn submit(&self, endorsement: Endorsement) -> LedgerResult<CommitStatus> {
        let mut log = self.ordering.lock().map_err(|_| LedgerError::LockPoisoned)?;
        let proposal = &endorsement.proposal;

        let mut validation = ValidationCode::Valid;
        for (key, seen) in &endorsement.rw_set.reads {
            if self.state.version(key)? != *seen {
                validation = ValidationCode::MvccReadConflict;
                break;
            }
        }

        // The entry is sealed before the write set is applied and logged only
        // afterwards, so world state never changes without a log entry.
        let entry = log.seal(
            proposal.tx_id,
            proposal.call.function(),
            proposal.call.args(),
            proposal.timestamp,
            validation,
        )?;
        let seq = entry.seq;
        if validation.is_valid() {
            self.state.apply_writes(&endorsement.rw_set.writes, seq)?;
        }
        log.push(entry.clone());

        if validation.is_valid() {
            info!(seq, tx_id = %entry.tx_id.short_hex(), function = %entry.function, "transaction committed");
        } else {
            warn!(seq, tx_id = %entry.tx_id.short_hex(), code = %validation, "transaction invalidated at commit");
        }
        Ok(CommitStatus::from(&entry))
    }

    /// Finality status of an ordered transaction.
    pub fn commit_status(&self, tx_id: &TxId) -> LedgerResult<CommitStatus> {
        let log = self.ordering.lock().map_err(|_| LedgerError::LockPoisoned)?;
        log.get(tx_id)
            .map(CommitStatus::from)
            .ok_or_else(|| LedgerError::UnknownTransaction(tx_id.to_hex()))
    }

    /// Run a read-only call against committed state. Nothing is logged.
    pub fn evaluate(&self, call: &ContractCall) -> LedgerResult<Vec<u8>> {
        if !call.is_read_only() {
            return Err(ContractError::InvalidArgument(format!(
                "{} cannot be evaluated; submit it as a transaction",
                call.function()
            ))
            .into());
        }
        let ctx = TxContext {
            tx_id: TxId::derive(&self.channel, &self.contract_name, b"evaluate"),
            timestamp: Utc::now(),
        };
        Ok(self.contract.invoke(&self.state, &ctx, call)?)
    }

    pub fn read_product(&self, id: &ProductId) -> LedgerResult<LedgerProduct> {
        Ok(self.contract.read(&self.state, id)?)
    }

    pub fn list_products(&self) -> LedgerResult<Vec<LedgerProduct>> {
        Ok(self.contract.list_all(&self.state)?)
    }

    /// Snapshot of every ordered transaction.
    pub fn transactions(&self) -> LedgerResult<Vec<CommittedTx>> {
        let log = self.ordering.lock().map_err(|_| LedgerError::LockPoisoned)?;
        Ok(log.entries().to_vec())
    }

    /// Re-verify the hash chain of the transaction log.
    pub fn validate_log(&self) -> LedgerResult<()> {
        let log = self.ordering.lock().map_err(|_| LedgerError::LockPoisoned)?;
        log.validate()
    }

    pub fn world_state(&self) -> &InMemoryWorldState {
        &self.state
    }
}

impl Default for LedgerNetwork {
    fn default() -> Self {
        Self::new("mychannel", "product_cc")
    }
}

impl std::fmt::Debug for LedgerNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerNetwork")
            .field("channel", &self.channel)
            .field("contract", &self.contract_name)
            .field("keys", &self.state.len())
            .finish()
    }
}
