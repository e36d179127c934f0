//! Receipt upload and signed download handlers.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use crate::services::{sniff_content_type, ReceiptStore};
use crate::{ApiError, AppState};

use super::parse_id;

fn receipts(state: &AppState) -> Result<&ReceiptStore, ApiError> {
    state.receipts.as_ref().ok_or_else(|| {
        ApiError::ServiceUnavailable(
            "Receipt storage not configured. Set STORAGE_SIGNING_SECRET.".to_string(),
        )
    })
}

/// `POST /upload` (multipart: `file`, `user_id`).
///
/// Returns the stored key and a URL signed for seven days.
pub async fn upload_receipt(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let store = receipts(&state)?;

    let mut file: Option<(String, Vec<u8>)> = None;
    let mut user_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let field_name = field.name().map(|n| n.to_string());
        match field_name.as_deref() {
            Some("file") => {
                let name = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Read error: {}", e)))?;
                file = Some((name, data.to_vec()));
            }
            Some("user_id") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Read error: {}", e)))?;
                if !value.trim().is_empty() {
                    user_id = Some(value.trim().to_string());
                }
            }
            _ => {}
        }
    }

    let (Some((file_name, data)), Some(user_id)) = (file, user_id) else {
        return Err(ApiError::BadRequest("Missing file or user_id".to_string()));
    };
    if data.is_empty() {
        return Err(ApiError::BadRequest("Uploaded file is empty".to_string()));
    }
    let user_id = parse_id("user_id", &user_id)?;

    let stored = store
        .upload(user_id, &file_name, &data, Utc::now().timestamp_millis())
        .await?;
    Ok(Json(stored))
}

#[derive(Debug, Deserialize)]
pub struct SignedQuery {
    pub expires: Option<i64>,
    pub signature: Option<String>,
}

/// `GET /storage/{bucket}/{*key}?expires=&signature=`
pub async fn download_receipt(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<SignedQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let store = receipts(&state)?;
    if bucket != store.bucket() {
        return Err(ApiError::NotFound(format!("bucket {}", bucket)));
    }

    let (Some(expires), Some(signature)) = (query.expires, query.signature.as_deref()) else {
        return Err(ApiError::Forbidden("Missing signature".to_string()));
    };
    if !store.verify(&key, expires, signature, Utc::now().timestamp()) {
        return Err(ApiError::Forbidden("Invalid or expired signature".to_string()));
    }

    let data = store.read(&key).await?;
    let content_type = sniff_content_type(&data);
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "private, max-age=3600"),
        ],
        data,
    ))
}
