use axum::{extract::State, http::StatusCode};

use crate::api::extractors::{AdminAuth, ApiPath};
use crate::state::AppState;

use super::WebhookApiError;

/// `DELETE /webhooks/{id}` — remove a subscription.
///
/// Its delivery history stays queryable under the same id.
pub async fn delete_webhook(
    State(state): State<AppState>,
    auth: AdminAuth,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, WebhookApiError> {
    if !state.store.delete_webhook(id).await? {
        return Err(WebhookApiError::NotFound);
    }
    tracing::info!(webhook_id = id, principal = %auth.principal, "Webhook deleted");
    Ok(StatusCode::NO_CONTENT)
}
