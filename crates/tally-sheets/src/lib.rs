//! # tally-sheets
//!
//! Spreadsheet mirror for tally, backed by the Google Sheets v4 API.
//!
//! - [`GoogleSheetsClient`]: append, update, delete, and read rows of one tab
//! - [`ServiceAccountTokenProvider`]: service-account JWT bearer exchange with
//!   token caching
//! - [`mock::MockSheetMirror`] (feature `mock`): in-memory tab for tests
//!
//! No call is retried; every failure surfaces as `Error::Mirror`.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use auth::{ServiceAccountTokenProvider, StaticTokenProvider, TokenProvider};
pub use client::{parse_updated_range, GoogleSheetsClient};
pub use config::SheetsConfig;
pub use error::SheetsErrorCode;
