use axum::{extract::State, http::StatusCode};
use evhub_core::processors::PublishError;
use evhub_sdk::objects::PublishEventRequest;

use crate::api::extractors::{AdminAuth, ApiJson};
use crate::api::webhooks::WebhookApiError;
use crate::state::AppState;

/// `POST /events` — producer ingress for out-of-process publishers.
///
/// Replies `202 Accepted` once the event is queued, or `503` once the
/// dispatcher has stopped. Delivery outcomes are never reported back to the
/// producer.
pub async fn publish_event(
    State(state): State<AppState>,
    auth: AdminAuth,
    ApiJson(request): ApiJson<PublishEventRequest>,
) -> Result<StatusCode, WebhookApiError> {
    state
        .dispatcher
        .publish_json(&request.event_type, request.payload)
        .await
        .map_err(|e| match e {
            PublishError::Invalid(e) => WebhookApiError::Validation(e.to_string()),
            PublishError::Stopped => WebhookApiError::Unavailable,
        })?;
    tracing::debug!(
        event_type = %request.event_type,
        principal = %auth.principal,
        "Event accepted"
    );
    Ok(StatusCode::ACCEPTED)
}
