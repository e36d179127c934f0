//! Centralized default constants for tally.
//!
//! Crates reference these instead of defining their own magic numbers.

// =============================================================================
// TRANSACTIONS
// =============================================================================

/// Currency used when a transaction does not name one.
pub const CURRENCY: &str = "USD";

/// Maximum rows returned by the transaction listing endpoint.
pub const TRANSACTION_LIST_LIMIT: i64 = 5000;

/// Label used for expenses without a category in summaries.
pub const UNCATEGORIZED: &str = "Uncategorized";

// =============================================================================
// SPREADSHEET MIRROR
// =============================================================================

/// Base URL of the Google Sheets v4 API.
pub const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4";

/// OAuth2 token endpoint for service-account assertions.
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// OAuth2 scope granting spreadsheet read/write.
pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Tab that receives transaction rows.
pub const SHEETS_TAB: &str = "Transactions";

/// HTTP timeout for mirror calls (seconds).
pub const SHEETS_TIMEOUT_SECS: u64 = 30;

/// Lifetime requested for service-account assertions (seconds).
pub const JWT_LIFETIME_SECS: i64 = 3600;

/// Cached access tokens are refreshed this long before they expire (seconds).
pub const TOKEN_REFRESH_MARGIN_SECS: u64 = 60;

// =============================================================================
// RECONCILIATION
// =============================================================================

/// Interval between reconciliation passes. Zero disables the worker.
pub const RECONCILE_INTERVAL_SECS: u64 = 0;

// =============================================================================
// RECEIPT STORAGE
// =============================================================================

/// Bucket receipts are uploaded to.
pub const STORAGE_BUCKET: &str = "receipts";

/// Local directory backing the blob store.
pub const STORAGE_PATH: &str = "./data/storage";

/// Validity of signed receipt URLs (7 days).
pub const SIGNED_URL_TTL_SECS: i64 = 60 * 60 * 24 * 7;

/// Maximum accepted upload size (10 MiB).
pub const UPLOAD_MAX_BYTES: usize = 10 * 1024 * 1024;
