//! HTTP handlers for tally-api.

pub mod categories;
pub mod transactions;
pub mod uploads;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use uuid::Uuid;

use crate::{ApiError, AppState};

/// Treat empty or whitespace-only values as absent.
pub(crate) fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub(crate) fn parse_id(field: &str, raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ApiError::BadRequest(format!("{} must be a valid id", field)))
}

/// `GET /health`
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let mirror = if state.sync.mirror().is_enabled() {
        "enabled"
    } else {
        "disabled"
    };
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "mirror": mirror,
    }))
}
