//! Ledger client for ptrack.
//!
//! The [`Gateway`] is the only way the pipeline talks to the ledger. It
//! drives a transaction through its three network round-trips, each under its
//! own bound:
//!
//! 1. connect (once, lazily): `connect_timeout`
//! 2. endorse + submit to ordering: `endorse_timeout`, `submit_timeout`
//! 3. wait for commit finality: `commit_status_timeout`
//!
//! Every failure is classified as either a business rejection (the ledger
//! answered "no", e.g. duplicate id) or a transport failure (we never got a
//! definitive answer). See [`GatewayError`].
//!
//! The network itself sits behind the [`LedgerPeer`] trait; [`InProcessPeer`]
//! connects the gateway to an in-process [`ptrack_ledger::LedgerNetwork`].

pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod peer;

pub use client::{CommitReceipt, CreateRequest, LedgerClient};
pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult, PeerError, RejectionKind, TransportFailure};
pub use gateway::Gateway;
pub use peer::{InProcessPeer, LedgerPeer};
