use axum::{Json, extract::State, response::IntoResponse};

use crate::api::extractors::{AdminAuth, ApiPath};
use crate::state::AppState;

use super::{WebhookApiError, webhook_to_response};

/// `GET /webhooks/{id}`
pub async fn get_webhook(
    State(state): State<AppState>,
    _auth: AdminAuth,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, WebhookApiError> {
    let webhook = state
        .store
        .get_webhook(id)
        .await?
        .ok_or(WebhookApiError::NotFound)?;
    Ok(Json(webhook_to_response(&webhook)))
}
