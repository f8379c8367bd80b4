//! WebhookSender processor.
//!
//! The WebhookSender is responsible for:
//! - Resolving the active subscriptions for an event's type
//! - Spawning one independent delivery task per subscription
//! - Recording a pending delivery before the request goes out
//! - Sending a signed HTTP POST with a bounded timeout
//! - Completing the record and the webhook's counters with the outcome
//!
//! There is no retry. A failed attempt stays `failed`.

use std::sync::Arc;

use crate::config::DeliveryConfig;
use crate::entities::webhook::Webhook;
use crate::entities::webhook_delivery::{DeliveryOutcome, NewDelivery, WebhookDelivery};
use crate::events::{Event, EventType};
use crate::store::{StoreError, WebhookStore};
use evhub_sdk::objects::DeliveryChannel;
use evhub_sdk::signature::{
    EVENT_HEADER, SIGNATURE_HEADER, WEBHOOK_ID_HEADER, canonical_payload, signature_header,
};
use serde_json::Value;
use tokio::sync::{RwLock, Semaphore};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// WebhookSender fans events out to registered webhook endpoints.
///
/// Cloning is cheap; clones share the HTTP client, the concurrency limit and
/// the task tracker.
#[derive(Clone)]
pub struct WebhookSender {
    store: Arc<dyn WebhookStore>,
    http_client: reqwest::Client,
    config: Arc<RwLock<DeliveryConfig>>,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
}

impl WebhookSender {
    /// Create a new WebhookSender.
    ///
    /// The concurrency limit is taken from `config` once. Timeouts and the
    /// excerpt limit are re-read for every attempt.
    pub async fn new(store: Arc<dyn WebhookStore>, config: Arc<RwLock<DeliveryConfig>>) -> Self {
        let max_concurrent = config.read().await.max_concurrent.max(1);
        Self {
            store,
            http_client: reqwest::Client::builder()
                .user_agent(concat!("evhub/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            config,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            tracker: TaskTracker::new(),
        }
    }

    /// Schedule deliveries of `event` to every matching active webhook.
    ///
    /// Returns the number of delivery tasks spawned. Store failures while
    /// resolving subscriptions are logged and yield zero.
    pub async fn dispatch(&self, event: Arc<Event>) -> usize {
        if !event.event_type().allowed_on(DeliveryChannel::Webhook) {
            return 0;
        }

        let webhooks = match self.store.active_webhooks_for(event.event_type()).await {
            Ok(webhooks) => webhooks,
            Err(e) => {
                error!(
                    event_type = %event.event_type(),
                    error = %e,
                    "Failed to resolve webhook subscriptions"
                );
                return 0;
            }
        };

        let scheduled = webhooks.len();
        for webhook in webhooks {
            let sender = self.clone();
            let event = event.clone();
            self.tracker.spawn(async move {
                let Ok(_permit) = sender.permits.clone().acquire_owned().await else {
                    return;
                };
                if let Err(e) = sender.deliver(&webhook, &event).await {
                    error!(
                        webhook_id = webhook.id,
                        error = %e,
                        "Failed to record webhook delivery"
                    );
                }
            });
        }

        if scheduled > 0 {
            debug!(
                event_type = %event.event_type(),
                scheduled,
                "Webhook deliveries scheduled"
            );
        }
        scheduled
    }

    /// Perform one delivery attempt and return the completed record.
    ///
    /// If the pending record cannot be created the request is not sent.
    pub async fn deliver(
        &self,
        webhook: &Webhook,
        event: &Event,
    ) -> Result<WebhookDelivery, StoreError> {
        let payload = event.payload();
        let pending = self
            .store
            .create_pending_delivery(NewDelivery {
                webhook_id: webhook.id,
                event_type: event.event_type(),
                payload: Value::Object(payload.clone()),
            })
            .await?;

        let outcome = match canonical_payload(payload) {
            Ok(body) => self.send(webhook, event.event_type(), body).await,
            Err(e) => {
                DeliveryOutcome::failed(None, None, format!("failed to serialize payload: {e}"))
            }
        };

        if outcome.is_success() {
            info!(
                webhook_id = webhook.id,
                delivery_id = pending.id,
                status = ?outcome.http_status_code,
                "Webhook delivered"
            );
        } else {
            warn!(
                webhook_id = webhook.id,
                delivery_id = pending.id,
                status = ?outcome.http_status_code,
                error = outcome.error_message.as_deref().unwrap_or_default(),
                "Webhook delivery failed"
            );
        }

        self.store
            .complete_delivery(pending.id, webhook.id, outcome)
            .await
    }

    /// Stop accepting new deliveries and wait for in-flight ones.
    pub async fn shutdown(&self) {
        self.tracker.close();
        info!(
            in_flight = self.tracker.len(),
            "Waiting for in-flight webhook deliveries"
        );
        self.tracker.wait().await;
    }

    async fn send(
        &self,
        webhook: &Webhook,
        event_type: EventType,
        body: String,
    ) -> DeliveryOutcome {
        let (timeout, excerpt_limit) = {
            let config = self.config.read().await;
            (config.timeout, config.response_excerpt_limit)
        };

        let mut request = self
            .http_client
            .post(&webhook.url)
            .timeout(timeout)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(EVENT_HEADER, event_type.as_str())
            .header(WEBHOOK_ID_HEADER, webhook.id.to_string());

        if let Some(secret) = webhook.secret.as_deref() {
            request = request.header(
                SIGNATURE_HEADER,
                signature_header(secret.as_bytes(), body.as_bytes()),
            );
        }

        let response = match request.body(body).send().await {
            Ok(response) => response,
            Err(e) => {
                return DeliveryOutcome::failed(None, None, describe_request_error(&e, timeout));
            }
        };

        let status = response.status();
        let excerpt = match read_excerpt(response, excerpt_limit).await {
            Ok(excerpt) => excerpt,
            Err(e) if status.is_success() => {
                debug!(
                    webhook_id = webhook.id,
                    error = %e,
                    "Failed to read response body"
                );
                None
            }
            Err(e) => {
                return DeliveryOutcome::failed(
                    Some(status.as_u16()),
                    None,
                    format!(
                        "HTTP {}; {}",
                        status.as_u16(),
                        describe_request_error(&e, timeout)
                    ),
                );
            }
        };

        if status.is_success() {
            DeliveryOutcome::success(status.as_u16(), excerpt)
        } else {
            DeliveryOutcome::failed(
                Some(status.as_u16()),
                excerpt,
                format!("HTTP {}", status.as_u16()),
            )
        }
    }
}

fn describe_request_error(e: &reqwest::Error, timeout: std::time::Duration) -> String {
    if e.is_timeout() {
        format!("request timed out after {}s", timeout.as_secs_f64())
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else if e.is_builder() {
        format!("invalid request: {e}")
    } else {
        format!("request failed: {e}")
    }
}

/// Read at most `limit` bytes of the body. Stops reading once the limit is
/// reached. Empty bodies yield `None`.
async fn read_excerpt(
    mut response: reqwest::Response,
    limit: usize,
) -> Result<Option<String>, reqwest::Error> {
    let mut buf: Vec<u8> = Vec::new();
    while buf.len() < limit {
        match response.chunk().await? {
            Some(chunk) => buf.extend_from_slice(&chunk),
            None => break,
        }
    }
    if buf.is_empty() {
        return Ok(None);
    }
    Ok(Some(truncate_utf8(&buf, limit)))
}

/// Decode up to `limit` bytes, backing off to the previous character
/// boundary.
fn truncate_utf8(bytes: &[u8], limit: usize) -> String {
    let mut end = bytes.len().min(limit);
    let text = loop {
        match std::str::from_utf8(&bytes[..end]) {
            Ok(text) => break text,
            // Only a multi-byte sequence cut at the end is trimmed.
            Err(e) if e.error_len().is_none() => end = e.valid_up_to(),
            Err(_) => return String::from_utf8_lossy(&bytes[..end]).into_owned(),
        }
    };
    text.to_string()
}
