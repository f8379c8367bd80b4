//! Persistence seams for subscriptions and delivery history.
//!
//! [`PgWebhookStore`] backs production. [`MemoryWebhookStore`] keeps the same
//! contract in process, for tests and for running without a database.

mod memory;
mod postgres;

pub use memory::MemoryWebhookStore;
pub use postgres::PgWebhookStore;

use std::collections::BTreeMap;

use crate::entities::webhook::{NewWebhook, Webhook, WebhookCounts, WebhookFilter, WebhookPatch};
use crate::entities::webhook_delivery::{
    DeliveryCounts, DeliveryOutcome, NewDelivery, WebhookDelivery,
};
use crate::entities::{DeliveryStatus, Page};
use crate::events::EventType;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("delivery {0} does not exist")]
    DeliveryNotFound(i64),
}

/// CRUD over webhook subscriptions.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn create_webhook(&self, new: NewWebhook) -> Result<Webhook, StoreError>;

    /// One page in id order plus the total matching `filter`.
    async fn list_webhooks(
        &self,
        filter: WebhookFilter,
        page: Page,
    ) -> Result<(Vec<Webhook>, i64), StoreError>;

    async fn get_webhook(&self, id: i64) -> Result<Option<Webhook>, StoreError>;

    async fn update_webhook(
        &self,
        id: i64,
        patch: WebhookPatch,
    ) -> Result<Option<Webhook>, StoreError>;

    /// Returns `false` if no such webhook existed.
    async fn delete_webhook(&self, id: i64) -> Result<bool, StoreError>;

    async fn active_webhooks_for(&self, event_type: EventType)
    -> Result<Vec<Webhook>, StoreError>;

    async fn webhook_counts(&self) -> Result<WebhookCounts, StoreError>;
}

/// Append-mostly delivery history.
#[async_trait]
pub trait DeliveryStore: Send + Sync {
    async fn create_pending_delivery(&self, new: NewDelivery)
    -> Result<WebhookDelivery, StoreError>;

    /// Finalize a pending record and bump the webhook's counters atomically.
    async fn complete_delivery(
        &self,
        delivery_id: i64,
        webhook_id: i64,
        outcome: DeliveryOutcome,
    ) -> Result<WebhookDelivery, StoreError>;

    async fn list_deliveries(
        &self,
        webhook_id: i64,
        status: Option<DeliveryStatus>,
        page: Page,
    ) -> Result<(Vec<WebhookDelivery>, i64), StoreError>;

    async fn delivery_counts(&self) -> Result<DeliveryCounts, StoreError>;
}

/// Everything the dispatcher and the management API need from storage.
pub trait WebhookStore: SubscriptionStore + DeliveryStore {}

impl<T: SubscriptionStore + DeliveryStore> WebhookStore for T {}

/// Aggregated subscription and delivery statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookStats {
    pub total: i64,
    pub active: i64,
    pub inactive: i64,
    /// Every webhook-deliverable event type, zero-filled.
    pub by_event_type: BTreeMap<EventType, i64>,
    pub deliveries: DeliveryCounts,
    pub delivery_success_rate: f64,
}

impl WebhookStats {
    pub fn new(webhooks: WebhookCounts, deliveries: DeliveryCounts) -> Self {
        let mut by_event_type: BTreeMap<EventType, i64> =
            EventType::webhook_types().map(|t| (t, 0)).collect();
        by_event_type.extend(webhooks.by_event_type);

        let completed = deliveries.successful + deliveries.failed;
        let delivery_success_rate = if completed == 0 {
            0.0
        } else {
            deliveries.successful as f64 / completed as f64
        };

        Self {
            total: webhooks.total,
            active: webhooks.active,
            inactive: webhooks.total - webhooks.active,
            by_event_type,
            deliveries,
            delivery_success_rate,
        }
    }
}

pub async fn collect_stats(store: &dyn WebhookStore) -> Result<WebhookStats, StoreError> {
    let webhooks = store.webhook_counts().await?;
    let deliveries = store.delivery_counts().await?;
    Ok(WebhookStats::new(webhooks, deliveries))
}
