use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use evhub_core::entities::webhook::NewWebhook;
use evhub_sdk::objects::CreateWebhookRequest;

use crate::api::extractors::{AdminAuth, ApiJson};
use crate::state::AppState;

use super::{WebhookApiError, webhook_to_response};

/// `POST /webhooks` — register a subscription. New subscriptions start active.
pub async fn create_webhook(
    State(state): State<AppState>,
    auth: AdminAuth,
    ApiJson(request): ApiJson<CreateWebhookRequest>,
) -> Result<impl IntoResponse, WebhookApiError> {
    let new = NewWebhook::try_from(request)?;
    let webhook = state.store.create_webhook(new).await?;
    tracing::info!(
        webhook_id = webhook.id,
        event_type = %webhook.event_type,
        principal = %auth.principal,
        "Webhook created"
    );
    Ok((StatusCode::CREATED, Json(webhook_to_response(&webhook))))
}
