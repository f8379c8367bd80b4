use axum::{Json, extract::State, response::IntoResponse};
use evhub_core::entities::webhook::WebhookPatch;
use evhub_sdk::objects::UpdateWebhookRequest;

use crate::api::extractors::{AdminAuth, ApiJson, ApiPath};
use crate::state::AppState;

use super::{WebhookApiError, webhook_to_response};

/// `PATCH /webhooks/{id}` — partial update.
///
/// Omitted fields are unchanged. `secret` and `description` may be set to
/// `null` to clear them. The event type cannot be changed.
pub async fn update_webhook(
    State(state): State<AppState>,
    auth: AdminAuth,
    ApiPath(id): ApiPath<i64>,
    ApiJson(request): ApiJson<UpdateWebhookRequest>,
) -> Result<impl IntoResponse, WebhookApiError> {
    let patch = WebhookPatch::try_from(request)?;
    let webhook = state
        .store
        .update_webhook(id, patch)
        .await?
        .ok_or(WebhookApiError::NotFound)?;
    tracing::info!(webhook_id = id, principal = %auth.principal, "Webhook updated");
    Ok(Json(webhook_to_response(&webhook)))
}
