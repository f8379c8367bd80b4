//! Webhook management API handlers.
//!
//! Every endpoint requires a management credential (see
//! [`crate::api::extractors::AdminAuth`]).
//!
//! # Endpoints
//!
//! - `POST   /webhooks`                  – create a subscription
//! - `GET    /webhooks`                  – list subscriptions (paginated, filterable)
//! - `GET    /webhooks/stats`            – aggregate statistics
//! - `GET    /webhooks/{id}`             – fetch one subscription
//! - `PATCH  /webhooks/{id}`             – partial update
//! - `DELETE /webhooks/{id}`             – remove a subscription (history is kept)
//! - `GET    /webhooks/{id}/deliveries`  – delivery history, newest first

use axum::{
    Json, Router,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use evhub_core::entities::webhook::{ValidationError, Webhook};
use evhub_core::entities::webhook_delivery::WebhookDelivery;
use evhub_core::store::{StoreError, WebhookStats};
use evhub_sdk::objects::{DeliveryResponse, WebhookResponse, WebhookStatsResponse};
use serde::Serialize;

use crate::state::AppState;

mod create_webhook;
mod delete_webhook;
mod get_webhook;
mod list_deliveries;
mod list_webhooks;
mod update_webhook;
mod webhook_stats;

/// Build the webhook management router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/webhooks",
            get(list_webhooks::list_webhooks).post(create_webhook::create_webhook),
        )
        .route("/webhooks/stats", get(webhook_stats::webhook_stats))
        .route(
            "/webhooks/{id}",
            get(get_webhook::get_webhook)
                .patch(update_webhook::update_webhook)
                .delete(delete_webhook::delete_webhook),
        )
        .route(
            "/webhooks/{id}/deliveries",
            get(list_deliveries::list_deliveries),
        )
}

// ---------------------------------------------------------------------------
// Shared error type
// ---------------------------------------------------------------------------

/// Errors that can occur in management API handlers.
#[derive(Debug)]
pub enum WebhookApiError {
    Validation(String),
    NotFound,
    Store(StoreError),
    /// The service is shutting down and no longer accepts work.
    Unavailable,
}

/// JSON body of every management API error response.
#[derive(Serialize)]
pub(crate) struct ErrorBody {
    pub error: String,
}

impl IntoResponse for WebhookApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error) = match self {
            WebhookApiError::Validation(message) => (StatusCode::BAD_REQUEST, message),
            WebhookApiError::NotFound => (StatusCode::NOT_FOUND, "resource not found".to_string()),
            WebhookApiError::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service is shutting down".to_string(),
            ),
            WebhookApiError::Store(e) => {
                tracing::error!(error = %e, "Management API store error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

impl From<StoreError> for WebhookApiError {
    fn from(e: StoreError) -> Self {
        WebhookApiError::Store(e)
    }
}

impl From<ValidationError> for WebhookApiError {
    fn from(e: ValidationError) -> Self {
        WebhookApiError::Validation(e.to_string())
    }
}

impl From<JsonRejection> for WebhookApiError {
    fn from(rejection: JsonRejection) -> Self {
        WebhookApiError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for WebhookApiError {
    fn from(rejection: QueryRejection) -> Self {
        WebhookApiError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for WebhookApiError {
    fn from(rejection: PathRejection) -> Self {
        WebhookApiError::Validation(rejection.body_text())
    }
}

// ---------------------------------------------------------------------------
// Conversion helpers
// ---------------------------------------------------------------------------

pub(crate) fn webhook_to_response(w: &Webhook) -> WebhookResponse {
    WebhookResponse {
        id: w.id,
        name: w.name.clone(),
        url: w.url.clone(),
        event_type: w.event_type.as_str().to_string(),
        has_secret: w.secret.is_some(),
        description: w.description.clone(),
        is_active: w.is_active,
        created_at: w.created_at,
        updated_at: w.updated_at,
        last_triggered_at: w.last_triggered_at,
        success_count: w.success_count,
        failure_count: w.failure_count,
    }
}

pub(crate) fn delivery_to_response(d: &WebhookDelivery) -> DeliveryResponse {
    DeliveryResponse {
        id: d.id,
        webhook_id: d.webhook_id,
        event_type: d.event_type.as_str().to_string(),
        payload: d.payload.clone(),
        status: d.status.into(),
        http_status_code: d.http_status_code,
        response_excerpt: d.response_excerpt.clone(),
        error_message: d.error_message.clone(),
        attempt_count: d.attempt_count,
        next_retry_at: d.next_retry_at,
        created_at: d.created_at,
        completed_at: d.completed_at,
    }
}

pub(crate) fn stats_to_response(s: &WebhookStats) -> WebhookStatsResponse {
    WebhookStatsResponse {
        total: s.total,
        active: s.active,
        inactive: s.inactive,
        by_event_type: s
            .by_event_type
            .iter()
            .map(|(t, n)| (t.as_str().to_string(), *n))
            .collect(),
        total_deliveries: s.deliveries.total,
        successful_deliveries: s.deliveries.successful,
        failed_deliveries: s.deliveries.failed,
        pending_deliveries: s.deliveries.pending,
        delivery_success_rate: s.delivery_success_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::extractors::API_KEY_HEADER;
    use crate::server::build_router;
    use crate::test_support::{TEST_TOKEN, test_state};
    use axum::body::Body;
    use axum::http::{Method, Request, Response};
    use evhub_core::entities::webhook_delivery::{DeliveryOutcome, NewDelivery};
    use evhub_core::events::EventType;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("Authorization", format!("Bearer {TEST_TOKEN}"));
        match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    fn create(name: &str, event_type: &str) -> Request<Body> {
        request(Method::POST, "/webhooks", Some(create_body(name, event_type)))
    }

    async fn json_body(response: Response<Body>) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn create_body(name: &str, event_type: &str) -> Value {
        json!({
            "name": name,
            "url": "https://hooks.example.com/in",
            "event_type": event_type,
            "secret": "s3cret",
        })
    }

    #[tokio::test]
    async fn requires_a_management_credential() {
        let router = build_router(test_state().await);

        let missing = router
            .clone()
            .oneshot(Request::get("/webhooks").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            json_body(missing).await,
            json!({"error": "missing credential"})
        );

        let wrong = router
            .clone()
            .oneshot(
                Request::get("/webhooks")
                    .header("Authorization", "Bearer nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            wrong.headers()["content-type"],
            "application/json",
            "401 bodies are JSON like every other error"
        );
        assert_eq!(
            json_body(wrong).await,
            json!({"error": "invalid credential"})
        );

        let api_key = router
            .oneshot(
                Request::get("/webhooks")
                    .header(API_KEY_HEADER, TEST_TOKEN)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(api_key.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_get_and_list() {
        let router = build_router(test_state().await);

        let created = router
            .clone()
            .oneshot(create("crm", "user.created"))
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);
        let created = json_body(created).await;
        assert_eq!(created["is_active"], true);
        assert_eq!(created["has_secret"], true);
        assert!(
            created.get("secret").is_none(),
            "secret must never be echoed"
        );
        assert_eq!(created["success_count"], 0);
        let id = created["id"].as_i64().unwrap();

        router
            .clone()
            .oneshot(create("pay", "payment.completed"))
            .await
            .unwrap();

        let fetched = router
            .clone()
            .oneshot(request(Method::GET, &format!("/webhooks/{id}"), None))
            .await
            .unwrap();
        assert_eq!(fetched.status(), StatusCode::OK);
        assert_eq!(json_body(fetched).await["name"], "crm");

        let filtered = router
            .clone()
            .oneshot(request(
                Method::GET,
                "/webhooks?event_type=payment.completed",
                None,
            ))
            .await
            .unwrap();
        let filtered = json_body(filtered).await;
        assert_eq!(filtered["total"], 1);
        assert_eq!(filtered["items"][0]["name"], "pay");
        assert_eq!(filtered["limit"], 20);

        let unknown = router
            .oneshot(request(
                Method::GET,
                "/webhooks?event_type=order.shipped",
                None,
            ))
            .await
            .unwrap();
        assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_rejects_invalid_input() {
        let state = test_state().await;
        let router = build_router(state.clone());

        for body in [
            create_body("", "user.created"),
            create_body("live", "ticket.message_added"),
            create_body("bogus", "order.shipped"),
            json!({
                "name": "x",
                "url": "ftp://example.com",
                "event_type": "user.created",
            }),
            json!({"name": "x"}),
        ] {
            let response = router
                .clone()
                .oneshot(request(Method::POST, "/webhooks", Some(body.clone())))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
            assert!(json_body(response).await["error"].is_string());
        }

        let (_, total) = state
            .store
            .list_webhooks(Default::default(), Default::default())
            .await
            .unwrap();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn missing_ids_are_not_found() {
        let router = build_router(test_state().await);
        for (method, body) in [
            (Method::GET, None),
            (Method::PATCH, Some(json!({"name": "x"}))),
            (Method::DELETE, None),
        ] {
            let response = router
                .clone()
                .oneshot(request(method.clone(), "/webhooks/999", body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{method}");
        }

        let bad_id = router
            .oneshot(request(Method::GET, "/webhooks/abc", None))
            .await
            .unwrap();
        assert_eq!(bad_id.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn patch_updates_fields_but_not_event_type() {
        let router = build_router(test_state().await);
        let created = router
            .clone()
            .oneshot(create("crm", "user.created"))
            .await
            .unwrap();
        let id = json_body(created).await["id"].as_i64().unwrap();
        let uri = format!("/webhooks/{id}");

        let patch = json!({"is_active": false, "secret": null, "description": "paused"});
        let updated = router
            .clone()
            .oneshot(request(Method::PATCH, &uri, Some(patch)))
            .await
            .unwrap();
        assert_eq!(updated.status(), StatusCode::OK);
        let updated = json_body(updated).await;
        assert_eq!(updated["is_active"], false);
        assert_eq!(updated["has_secret"], false);
        assert_eq!(updated["description"], "paused");
        assert_eq!(updated["name"], "crm");

        let retype = json!({"event_type": "payment.completed"});
        let retype = router
            .clone()
            .oneshot(request(Method::PATCH, &uri, Some(retype)))
            .await
            .unwrap();
        assert_eq!(retype.status(), StatusCode::BAD_REQUEST);

        let bad_url = router
            .oneshot(request(
                Method::PATCH,
                &uri,
                Some(json!({"url": "not a url"})),
            ))
            .await
            .unwrap();
        assert_eq!(bad_url.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_keeps_delivery_history() {
        let state = test_state().await;
        let router = build_router(state.clone());
        let created = router
            .clone()
            .oneshot(create("crm", "user.created"))
            .await
            .unwrap();
        let id = json_body(created).await["id"].as_i64().unwrap();

        let delivery = state
            .store
            .create_pending_delivery(NewDelivery {
                webhook_id: id,
                event_type: EventType::UserCreated,
                payload: json!({"user_id": 9}),
            })
            .await
            .unwrap();
        let outcome = DeliveryOutcome::failed(Some(503), None, "HTTP 503");
        state
            .store
            .complete_delivery(delivery.id, id, outcome)
            .await
            .unwrap();

        let deleted = router
            .clone()
            .oneshot(request(Method::DELETE, &format!("/webhooks/{id}"), None))
            .await
            .unwrap();
        assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

        let gone = router
            .clone()
            .oneshot(request(Method::GET, &format!("/webhooks/{id}"), None))
            .await
            .unwrap();
        assert_eq!(gone.status(), StatusCode::NOT_FOUND);

        let uri = format!("/webhooks/{id}/deliveries?status=failed");
        let history = router
            .clone()
            .oneshot(request(Method::GET, &uri, None))
            .await
            .unwrap();
        assert_eq!(history.status(), StatusCode::OK);
        let history = json_body(history).await;
        assert_eq!(history["total"], 1);
        assert_eq!(history["items"][0]["status"], "failed");
        assert_eq!(history["items"][0]["http_status_code"], 503);

        let uri = format!("/webhooks/{id}/deliveries?status=lost");
        let bad_status = router
            .oneshot(request(Method::GET, &uri, None))
            .await
            .unwrap();
        assert_eq!(bad_status.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn stats_cover_every_webhook_event_type() {
        let router = build_router(test_state().await);
        router
            .clone()
            .oneshot(create("crm", "user.created"))
            .await
            .unwrap();

        let stats = router
            .oneshot(request(Method::GET, "/webhooks/stats", None))
            .await
            .unwrap();
        assert_eq!(stats.status(), StatusCode::OK);
        let stats = json_body(stats).await;
        assert_eq!(stats["total"], 1);
        assert_eq!(stats["active"], 1);
        assert_eq!(stats["inactive"], 0);
        assert_eq!(stats["by_event_type"]["user.created"], 1);
        assert_eq!(stats["by_event_type"]["ticket.created"], 0);
        assert!(stats["by_event_type"].get("ticket.message_added").is_none());
        assert_eq!(stats["delivery_success_rate"], 0.0);
    }
}
