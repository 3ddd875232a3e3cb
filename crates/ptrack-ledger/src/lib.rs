//! Replicated product ledger for ptrack.
//!
//! This crate is the authoritative, append-only side of the pipeline. It
//! provides:
//! - The [`ProductContract`] state machine (`exists` / `create` / `read` /
//!   `list_all`) over any [`WorldState`]
//! - [`InMemoryWorldState`], a versioned key-value world state
//! - [`TransactionLog`], a hash-linked log of every ordered transaction
//! - [`LedgerNetwork`], which simulates proposals against a read/write set,
//!   orders them under a single lock and validates them at commit time
//!
//! Uniqueness of product ids is enforced by a single conditional put
//! ([`WorldState::put_if_absent`]). Inside the network the put is recorded in
//! the read/write set and re-validated at commit, so two racing creates for
//! the same id can never both commit.

pub mod contract;
pub mod error;
pub mod log;
pub mod network;
pub mod state;

pub use contract::{ContractCall, LedgerProduct, LedgerStatus, ProductContract, TxContext};
pub use error::{ContractError, LedgerError, LedgerResult};
pub use log::{CommittedTx, TransactionLog, ValidationCode};
pub use network::{CommitStatus, Endorsement, LedgerNetwork, Proposal, ReadWriteSet};
pub use state::{InMemoryWorldState, WorldState};
