//! # tally-core
//!
//! Core types, traits, and abstractions for tally, a personal finance
//! tracker that mirrors every transaction into a spreadsheet.
//!
//! This crate provides the domain models, the error type, the repository and
//! mirror traits, and the row mapper that defines the mirror's column
//! contract.
//!
//! ## Logging
//!
//! All crates log through `tracing` with a shared field vocabulary:
//! `subsystem` ("api", "sync", "db", "sheets", "storage"), `component`,
//! `op`, `transaction_id`, `user_id`, `row_locator`, `duration_ms`,
//! `row_count`, and `error`.
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Best-effort mirror failure, tracking lost, fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), reconciliation passes |
//! | DEBUG | Decision points (mirror skipped, locator parsed) |
//! | TRACE | Per-row iteration during reconciliation |

pub mod defaults;
pub mod error;
pub mod models;
pub mod row;
pub mod summary;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, MirrorOp, Result};
pub use models::*;
pub use row::{from_row, to_row, Cell, MirrorRecord, SheetRow, ROW_WIDTH};
pub use summary::{summarize, CategoryTotal, MonthlyNet, Summary};
pub use traits::*;
