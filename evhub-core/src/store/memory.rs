use std::collections::BTreeMap;

use super::{DeliveryStore, StoreError, SubscriptionStore};
use crate::entities::webhook::{NewWebhook, Webhook, WebhookCounts, WebhookFilter, WebhookPatch};
use crate::entities::webhook_delivery::{
    DeliveryCounts, DeliveryOutcome, NewDelivery, WebhookDelivery,
};
use crate::entities::{DeliveryStatus, Page};
use crate::events::EventType;
use async_trait::async_trait;
use itertools::Itertools;
use time::OffsetDateTime;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct State {
    next_webhook_id: i64,
    next_delivery_id: i64,
    webhooks: BTreeMap<i64, Webhook>,
    deliveries: BTreeMap<i64, WebhookDelivery>,
}

/// In-process store with the same semantics as [`super::PgWebhookStore`].
///
/// A single lock guards both tables, so every read sees a consistent snapshot.
#[derive(Debug, Default)]
pub struct MemoryWebhookStore {
    state: RwLock<State>,
}

impl MemoryWebhookStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn paginate<T>(items: impl Iterator<Item = T>, page: Page) -> Vec<T> {
    items
        .skip(page.offset as usize)
        .take(page.limit as usize)
        .collect()
}

#[async_trait]
impl SubscriptionStore for MemoryWebhookStore {
    async fn create_webhook(&self, new: NewWebhook) -> Result<Webhook, StoreError> {
        let mut state = self.state.write().await;
        state.next_webhook_id += 1;
        let now = OffsetDateTime::now_utc();
        let webhook = Webhook {
            id: state.next_webhook_id,
            name: new.name,
            url: new.url,
            event_type: new.event_type,
            secret: new.secret,
            description: new.description,
            is_active: true,
            created_at: now,
            updated_at: now,
            last_triggered_at: None,
            success_count: 0,
            failure_count: 0,
        };
        state.webhooks.insert(webhook.id, webhook.clone());
        Ok(webhook)
    }

    async fn list_webhooks(
        &self,
        filter: WebhookFilter,
        page: Page,
    ) -> Result<(Vec<Webhook>, i64), StoreError> {
        let state = self.state.read().await;
        let matching: Vec<&Webhook> = state
            .webhooks
            .values()
            .filter(|w| filter.matches(w))
            .collect();
        let total = matching.len() as i64;
        Ok((paginate(matching.into_iter().cloned(), page), total))
    }

    async fn get_webhook(&self, id: i64) -> Result<Option<Webhook>, StoreError> {
        Ok(self.state.read().await.webhooks.get(&id).cloned())
    }

    async fn update_webhook(
        &self,
        id: i64,
        patch: WebhookPatch,
    ) -> Result<Option<Webhook>, StoreError> {
        let mut state = self.state.write().await;
        let Some(webhook) = state.webhooks.get_mut(&id) else {
            return Ok(None);
        };
        if patch.apply(webhook) {
            webhook.updated_at = OffsetDateTime::now_utc();
        }
        Ok(Some(webhook.clone()))
    }

    async fn delete_webhook(&self, id: i64) -> Result<bool, StoreError> {
        Ok(self.state.write().await.webhooks.remove(&id).is_some())
    }

    async fn active_webhooks_for(
        &self,
        event_type: EventType,
    ) -> Result<Vec<Webhook>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .webhooks
            .values()
            .filter(|w| w.is_active && w.event_type == event_type)
            .cloned()
            .collect())
    }

    async fn webhook_counts(&self) -> Result<WebhookCounts, StoreError> {
        let state = self.state.read().await;
        let by_event_type = state
            .webhooks
            .values()
            .map(|w| w.event_type)
            .counts()
            .into_iter()
            .map(|(t, n)| (t, n as i64))
            .collect();
        Ok(WebhookCounts {
            total: state.webhooks.len() as i64,
            active: state.webhooks.values().filter(|w| w.is_active).count() as i64,
            by_event_type,
        })
    }
}

#[async_trait]
impl DeliveryStore for MemoryWebhookStore {
    async fn create_pending_delivery(
        &self,
        new: NewDelivery,
    ) -> Result<WebhookDelivery, StoreError> {
        let mut state = self.state.write().await;
        state.next_delivery_id += 1;
        let delivery = WebhookDelivery {
            id: state.next_delivery_id,
            webhook_id: new.webhook_id,
            event_type: new.event_type,
            payload: new.payload,
            status: DeliveryStatus::Pending,
            http_status_code: None,
            response_excerpt: None,
            error_message: None,
            attempt_count: 1,
            next_retry_at: None,
            created_at: OffsetDateTime::now_utc(),
            completed_at: None,
        };
        state.deliveries.insert(delivery.id, delivery.clone());
        Ok(delivery)
    }

    async fn complete_delivery(
        &self,
        delivery_id: i64,
        webhook_id: i64,
        outcome: DeliveryOutcome,
    ) -> Result<WebhookDelivery, StoreError> {
        let mut state = self.state.write().await;
        let now = OffsetDateTime::now_utc();
        let succeeded = outcome.is_success();

        let delivery = state
            .deliveries
            .get_mut(&delivery_id)
            .ok_or(StoreError::DeliveryNotFound(delivery_id))?;
        delivery.status = outcome.status;
        delivery.http_status_code = outcome.http_status_code;
        delivery.response_excerpt = outcome.response_excerpt;
        delivery.error_message = outcome.error_message;
        delivery.completed_at = Some(now);
        let delivery = delivery.clone();

        if let Some(webhook) = state.webhooks.get_mut(&webhook_id) {
            if succeeded {
                webhook.success_count += 1;
            } else {
                webhook.failure_count += 1;
            }
            webhook.last_triggered_at = Some(now);
        }
        Ok(delivery)
    }

    async fn list_deliveries(
        &self,
        webhook_id: i64,
        status: Option<DeliveryStatus>,
        page: Page,
    ) -> Result<(Vec<WebhookDelivery>, i64), StoreError> {
        let state = self.state.read().await;
        let matching: Vec<&WebhookDelivery> = state
            .deliveries
            .values()
            .filter(|d| d.webhook_id == webhook_id && status.is_none_or(|s| s == d.status))
            .sorted_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)))
            .collect();
        let total = matching.len() as i64;
        Ok((paginate(matching.into_iter().cloned(), page), total))
    }

    async fn delivery_counts(&self) -> Result<DeliveryCounts, StoreError> {
        let state = self.state.read().await;
        let by_status = state.deliveries.values().map(|d| d.status).counts();
        let count = |s: DeliveryStatus| by_status.get(&s).copied().unwrap_or(0) as i64;
        Ok(DeliveryCounts {
            total: state.deliveries.len() as i64,
            successful: count(DeliveryStatus::Success),
            failed: count(DeliveryStatus::Failed),
            pending: count(DeliveryStatus::Pending),
        })
    }
}
