//! # tally-sync
//!
//! Keeps the spreadsheet mirror consistent with the primary store.
//!
//! - [`TransactionSync`]: create, update, and delete with mirror side effects
//! - [`Reconciler`]: idempotent pass that repairs drift between the two
//! - [`ReconcileWorker`]: runs the reconciler on an interval
//! - [`memory::MemoryStore`] (feature `mock`): in-memory primary store
//!
//! The two stores are never updated atomically. Create treats the mirror as
//! best-effort; update and delete surface `Error::MirrorDesync` once the
//! primary mutation has committed. The reconciler converges whatever is left.

pub mod orchestrator;
pub mod reconcile;
pub mod worker;

#[cfg(any(test, feature = "mock"))]
pub mod memory;

pub use orchestrator::TransactionSync;
pub use reconcile::{ReconcileReport, Reconciler};
pub use worker::{ReconcileConfig, ReconcileEvent, ReconcileHandle, ReconcileWorker};
