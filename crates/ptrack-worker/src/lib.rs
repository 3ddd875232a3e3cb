//! Verification worker for ptrack.
//!
//! Consumes product-creation events, submits each to the ledger and writes
//! the outcome back to the reconciliation store:
//!
//! | ledger outcome                        | store status            |
//! |---------------------------------------|-------------------------|
//! | committed                             | `VERIFIED` + `ledgerTxId` |
//! | duplicate, ledger holds same product  | `VERIFIED` (recovered)  |
//! | duplicate with other content, invalid | `FAILED`, not retried   |
//! | transport failure, budget spent       | `FAILED` (+ dead letter) |
//!
//! The consumer position is committed only after the store write succeeds,
//! so a crash or a store outage leads to redelivery. Redelivery is safe: the
//! ledger refuses the second create and the worker reconciles against what
//! the ledger already holds.
//!
//! [`IntakeService`] is the producing side: it writes the `PENDING` row and
//! then publishes the event.

pub mod config;
pub mod error;
pub mod intake;
pub mod outcome;
pub mod worker;

pub use config::{RetryPolicy, WorkerConfig};
pub use error::{IntakeError, WorkerError, WorkerResult};
pub use intake::IntakeService;
pub use outcome::{DeadLetter, Disposition, Outcome};
pub use worker::VerificationWorker;
