use super::{DeliveryStore, StoreError, SubscriptionStore};
use crate::entities::webhook::{
    CountWebhooks, DeleteWebhook, GetWebhookById, InsertWebhook, ListActiveWebhooksForEvent,
    ListWebhooks, NewWebhook, UpdateWebhook, Webhook, WebhookCounts, WebhookFilter, WebhookPatch,
};
use crate::entities::webhook_delivery::{
    CompleteDelivery, CountDeliveries, DeliveryCounts, DeliveryOutcome, InsertPendingDelivery,
    ListDeliveriesByWebhook, NewDelivery, WebhookDelivery,
};
use crate::entities::{DeliveryStatus, Page};
use crate::events::EventType;
use crate::framework::DatabaseProcessor;
use async_trait::async_trait;
use kanau::processor::Processor;
use sqlx::PgPool;

/// PostgreSQL-backed store. Each call runs one processor command.
#[derive(Debug, Clone)]
pub struct PgWebhookStore {
    processor: DatabaseProcessor,
}

impl PgWebhookStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            processor: DatabaseProcessor::new(pool),
        }
    }
}

#[async_trait]
impl SubscriptionStore for PgWebhookStore {
    async fn create_webhook(&self, new: NewWebhook) -> Result<Webhook, StoreError> {
        self.processor.process(InsertWebhook(new)).await
    }

    async fn list_webhooks(
        &self,
        filter: WebhookFilter,
        page: Page,
    ) -> Result<(Vec<Webhook>, i64), StoreError> {
        self.processor.process(ListWebhooks { filter, page }).await
    }

    async fn get_webhook(&self, id: i64) -> Result<Option<Webhook>, StoreError> {
        self.processor.process(GetWebhookById { id }).await
    }

    async fn update_webhook(
        &self,
        id: i64,
        patch: WebhookPatch,
    ) -> Result<Option<Webhook>, StoreError> {
        self.processor.process(UpdateWebhook { id, patch }).await
    }

    async fn delete_webhook(&self, id: i64) -> Result<bool, StoreError> {
        self.processor.process(DeleteWebhook { id }).await
    }

    async fn active_webhooks_for(
        &self,
        event_type: EventType,
    ) -> Result<Vec<Webhook>, StoreError> {
        self.processor
            .process(ListActiveWebhooksForEvent { event_type })
            .await
    }

    async fn webhook_counts(&self) -> Result<WebhookCounts, StoreError> {
        self.processor.process(CountWebhooks).await
    }
}

#[async_trait]
impl DeliveryStore for PgWebhookStore {
    async fn create_pending_delivery(
        &self,
        new: NewDelivery,
    ) -> Result<WebhookDelivery, StoreError> {
        self.processor.process(InsertPendingDelivery(new)).await
    }

    async fn complete_delivery(
        &self,
        delivery_id: i64,
        webhook_id: i64,
        outcome: DeliveryOutcome,
    ) -> Result<WebhookDelivery, StoreError> {
        self.processor
            .process(CompleteDelivery {
                delivery_id,
                webhook_id,
                outcome,
            })
            .await
    }

    async fn list_deliveries(
        &self,
        webhook_id: i64,
        status: Option<DeliveryStatus>,
        page: Page,
    ) -> Result<(Vec<WebhookDelivery>, i64), StoreError> {
        self.processor
            .process(ListDeliveriesByWebhook {
                webhook_id,
                status,
                page,
            })
            .await
    }

    async fn delivery_counts(&self) -> Result<DeliveryCounts, StoreError> {
        self.processor.process(CountDeliveries).await
    }
}
