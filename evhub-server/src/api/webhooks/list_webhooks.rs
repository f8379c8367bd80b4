use axum::{Json, extract::State, response::IntoResponse};
use evhub_core::entities::Page;
use evhub_core::entities::webhook::WebhookFilter;
use evhub_core::events::EventType;
use evhub_sdk::objects::{ListWebhooksQuery, WebhookListResponse};

use crate::api::extractors::{AdminAuth, ApiQuery};
use crate::state::AppState;

use super::{WebhookApiError, webhook_to_response};

/// `GET /webhooks` — list subscriptions in id order with the matching total.
pub async fn list_webhooks(
    State(state): State<AppState>,
    _auth: AdminAuth,
    ApiQuery(query): ApiQuery<ListWebhooksQuery>,
) -> Result<impl IntoResponse, WebhookApiError> {
    let event_type = query
        .event_type
        .as_deref()
        .map(str::parse::<EventType>)
        .transpose()
        .map_err(|e| WebhookApiError::Validation(e.to_string()))?;
    let filter = WebhookFilter {
        event_type,
        is_active: query.is_active,
    };
    let page = Page::new(query.limit, query.offset);

    let (webhooks, total) = state.store.list_webhooks(filter, page).await?;

    Ok(Json(WebhookListResponse {
        items: webhooks.iter().map(webhook_to_response).collect(),
        total,
        limit: page.limit,
        offset: page.offset,
    }))
}
