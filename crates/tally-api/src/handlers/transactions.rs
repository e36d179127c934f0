//! Transaction HTTP handlers.
//!
//! Mutations go through the sync orchestrator; identity fields come from the
//! caller's session and are validated before anything else.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use tally_core::{defaults, summarize, CreateTransactionRequest, UpdateTransactionRequest};

use crate::{ApiError, AppState};

use super::{parse_id, present};

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: Option<String>,
}

/// Resolve the required `user_id` query parameter.
pub(crate) fn require_user(query: &UserQuery) -> Result<Uuid, ApiError> {
    let raw = present(query.user_id.as_deref())
        .ok_or_else(|| ApiError::BadRequest("user_id required".to_string()))?;
    parse_id("user_id", raw)
}

/// `GET /transactions?user_id=`: newest first, with category names.
pub async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user(&query)?;
    let data = state
        .transactions
        .list_for_user(user_id, defaults::TRANSACTION_LIST_LIMIT)
        .await?;
    Ok(Json(serde_json::json!({ "data": data })))
}

/// Identity fields followed by the raw transaction payload.
#[derive(Debug, Deserialize)]
pub struct MutationBody {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

fn payload<T: serde::de::DeserializeOwned>(fields: Map<String, Value>) -> Result<T, ApiError> {
    serde_json::from_value(Value::Object(fields))
        .map_err(|e| ApiError::BadRequest(format!("Invalid transaction: {}", e)))
}

/// `POST /transactions`: insert and mirror.
pub async fn create_transaction(
    State(state): State<AppState>,
    Json(body): Json<MutationBody>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(user_id), Some(user_email)) =
        (present(body.user_id.as_deref()), present(body.user_email.as_deref()))
    else {
        return Err(ApiError::BadRequest("Missing user context".to_string()));
    };
    let user_id = parse_id("user_id", user_id)?;

    let request: CreateTransactionRequest = payload(body.payload)?;
    let tx = state
        .sync
        .create(user_id, user_email, request.into_new()?)
        .await?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "data": tx }))))
}

/// `PUT /transactions`: partial update, rewriting the mirror row if tracked.
pub async fn update_transaction(
    State(state): State<AppState>,
    Json(body): Json<MutationBody>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(user_id), Some(user_email), Some(id)) = (
        present(body.user_id.as_deref()),
        present(body.user_email.as_deref()),
        present(body.id.as_deref()),
    ) else {
        return Err(ApiError::BadRequest("Missing fields".to_string()));
    };
    let user_id = parse_id("user_id", user_id)?;
    let id = parse_id("id", id)?;

    let request: UpdateTransactionRequest = payload(body.payload)?;
    let tx = state
        .sync
        .update(id, user_id, user_email, request.into_changes()?)
        .await?;

    Ok(Json(serde_json::json!({ "data": tx })))
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    pub id: Option<String>,
    pub user_id: Option<String>,
}

/// `DELETE /transactions?id=&user_id=`
pub async fn delete_transaction(
    State(state): State<AppState>,
    Query(query): Query<DeleteQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(id), Some(user_id)) = (present(query.id.as_deref()), present(query.user_id.as_deref()))
    else {
        return Err(ApiError::BadRequest("Missing id/user_id".to_string()));
    };
    let id = parse_id("id", id)?;
    let user_id = parse_id("user_id", user_id)?;

    state.sync.delete(id, user_id).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// `GET /transactions/summary?user_id=`: dashboard totals.
pub async fn transaction_summary(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user(&query)?;
    let items = state
        .transactions
        .list_for_user(user_id, defaults::TRANSACTION_LIST_LIMIT)
        .await?;
    debug!(subsystem = "api", user_id = %user_id, row_count = items.len(), "Summarizing");
    Ok(Json(summarize(&items)))
}

/// `POST /transactions/reconcile`: run one reconciliation pass now.
pub async fn reconcile_transactions(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state.reconciler.reconcile().await?;
    Ok(Json(report))
}
