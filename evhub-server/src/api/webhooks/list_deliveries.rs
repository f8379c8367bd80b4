use axum::{Json, extract::State, response::IntoResponse};
use evhub_core::entities::Page;
use evhub_sdk::objects::{DeliveryListResponse, ListDeliveriesQuery};

use crate::api::extractors::{AdminAuth, ApiPath, ApiQuery};
use crate::state::AppState;

use super::{WebhookApiError, delivery_to_response};

/// `GET /webhooks/{id}/deliveries` — delivery history, newest first.
///
/// Answers for any id, including deleted webhooks, whose history is
/// retained. An id that never had deliveries yields an empty page.
pub async fn list_deliveries(
    State(state): State<AppState>,
    _auth: AdminAuth,
    ApiPath(id): ApiPath<i64>,
    ApiQuery(query): ApiQuery<ListDeliveriesQuery>,
) -> Result<impl IntoResponse, WebhookApiError> {
    let page = Page::new(query.limit, query.offset);
    let (deliveries, total) = state
        .store
        .list_deliveries(id, query.status.map(Into::into), page)
        .await?;

    Ok(Json(DeliveryListResponse {
        items: deliveries.iter().map(delivery_to_response).collect(),
        total,
        limit: page.limit,
        offset: page.offset,
    }))
}
