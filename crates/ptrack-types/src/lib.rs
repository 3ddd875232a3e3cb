//! Foundation types for ptrack, the product verification pipeline.
//!
//! Every other ptrack crate depends on `ptrack-types`. The types here are
//! shared between the intake side (which writes `PENDING` rows and publishes
//! creation events), the verification worker, the ledger contract, and the
//! read-side API.
//!
//! # Key Types
//!
//! - [`ProductId`]: caller-supplied, globally unique product identifier
//! - [`ProductFields`]: immutable descriptive data submitted at intake
//! - [`ProductRecord`]: the relational system-of-record row
//! - [`ProductStatus`]: `PENDING` → `VERIFIED` | `FAILED`
//! - [`TxId`]: opaque reference to a committed ledger transaction
//! - [`CreationEvent`]: the JSON payload carried on the creation-event stream

pub mod error;
pub mod event;
pub mod id;
pub mod product;

pub use error::TypeError;
pub use event::CreationEvent;
pub use id::{ProductId, TxId};
pub use product::{ProductFields, ProductRecord, ProductStatus};
