//! Category HTTP handlers.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use tally_core::{CreateCategoryRequest, EntryType};

use crate::{ApiError, AppState};

use super::transactions::{require_user, UserQuery};
use super::{parse_id, present};

/// `GET /categories?user_id=`: ordered by name.
pub async fn list_categories(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user(&query)?;
    let data = state.categories.list(user_id).await?;
    Ok(Json(serde_json::json!({ "data": data })))
}

#[derive(Debug, Deserialize)]
pub struct CreateCategoryBody {
    pub user_id: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// `POST /categories`
pub async fn create_category(
    State(state): State<AppState>,
    Json(body): Json<CreateCategoryBody>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(user_id), Some(name), Some(kind)) = (
        present(body.user_id.as_deref()),
        present(body.name.as_deref()),
        present(body.kind.as_deref()),
    ) else {
        return Err(ApiError::BadRequest("Missing fields".to_string()));
    };
    let user_id = parse_id("user_id", user_id)?;
    let kind: EntryType = kind.parse()?;

    let category = state
        .categories
        .create(
            user_id,
            CreateCategoryRequest {
                name: name.trim().to_string(),
                kind,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "data": category }))))
}
