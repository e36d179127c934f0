//! Sheets API error handling.

use serde::Deserialize;
use tally_core::Error;

/// Sheets API error classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetsErrorCode {
    /// Malformed request or range.
    BadRequest,
    /// Invalid or expired credentials.
    Unauthenticated,
    /// Service account lacks access to the spreadsheet.
    PermissionDenied,
    /// Spreadsheet does not exist.
    NotFound,
    /// Quota exhausted.
    RateLimited,
    ServerError,
    Unknown,
}

impl SheetsErrorCode {
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => Self::BadRequest,
            401 => Self::Unauthenticated,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            429 => Self::RateLimited,
            500..=599 => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::BadRequest => "bad request",
            Self::Unauthenticated => "authentication failed",
            Self::PermissionDenied => "permission denied",
            Self::NotFound => "spreadsheet not found",
            Self::RateLimited => "rate limit exceeded",
            Self::ServerError => "server error",
            Self::Unknown => "unexpected response",
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Build a mirror error from a non-success status and its raw body.
pub fn to_tally_error(status: u16, body: &str) -> Error {
    let code = SheetsErrorCode::from_status(status);
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.trim().chars().take(200).collect());
    Error::Mirror(format!("Sheets API {} ({}): {}", code.label(), status, message))
}
