use axum::{Json, extract::State, response::IntoResponse};
use evhub_core::store::collect_stats;

use crate::api::extractors::AdminAuth;
use crate::state::AppState;

use super::{WebhookApiError, stats_to_response};

/// `GET /webhooks/stats`
pub async fn webhook_stats(
    State(state): State<AppState>,
    _auth: AdminAuth,
) -> Result<impl IntoResponse, WebhookApiError> {
    let stats = collect_stats(state.store.as_ref()).await?;
    Ok(Json(stats_to_response(&stats)))
}
