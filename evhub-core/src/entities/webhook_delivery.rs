use crate::entities::{DeliveryStatus, EventTypeName, Page};
use crate::events::EventType;
use crate::framework::DatabaseProcessor;
use crate::store::StoreError;
use kanau::processor::Processor;
use serde_json::Value;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;

/// One recorded delivery attempt of one event to one webhook.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookDelivery {
    pub id: i64,
    pub webhook_id: i64,
    pub event_type: EventType,
    pub payload: Value,
    pub status: DeliveryStatus,
    pub http_status_code: Option<u16>,
    pub response_excerpt: Option<String>,
    pub error_message: Option<String>,
    pub attempt_count: i32,
    /// Reserved for a retry scheduler. Always `None` today.
    pub next_retry_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub completed_at: Option<OffsetDateTime>,
}

#[derive(Debug, sqlx::FromRow)]
struct DeliveryRow {
    id: i64,
    webhook_id: i64,
    event_type: EventTypeName,
    payload: Value,
    status: DeliveryStatus,
    http_status_code: Option<i32>,
    response_excerpt: Option<String>,
    error_message: Option<String>,
    attempt_count: i32,
    next_retry_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    completed_at: Option<OffsetDateTime>,
}

impl TryFrom<DeliveryRow> for WebhookDelivery {
    type Error = StoreError;

    fn try_from(row: DeliveryRow) -> Result<Self, StoreError> {
        let http_status_code = row
            .http_status_code
            .map(|code| {
                u16::try_from(code).map_err(|_| {
                    StoreError::Corrupt(format!("http status code {code} out of range"))
                })
            })
            .transpose()?;
        Ok(Self {
            id: row.id,
            webhook_id: row.webhook_id,
            event_type: row.event_type.into(),
            payload: row.payload,
            status: row.status,
            http_status_code,
            response_excerpt: row.response_excerpt,
            error_message: row.error_message,
            attempt_count: row.attempt_count,
            next_retry_at: row.next_retry_at,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

/// Data for a new pending attempt.
#[derive(Debug, Clone)]
pub struct NewDelivery {
    pub webhook_id: i64,
    pub event_type: EventType,
    pub payload: Value,
}

/// Terminal result of one HTTP attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub status: DeliveryStatus,
    pub http_status_code: Option<u16>,
    pub response_excerpt: Option<String>,
    pub error_message: Option<String>,
}

impl DeliveryOutcome {
    pub fn success(http_status_code: u16, response_excerpt: Option<String>) -> Self {
        Self {
            status: DeliveryStatus::Success,
            http_status_code: Some(http_status_code),
            response_excerpt,
            error_message: None,
        }
    }

    pub fn failed(
        http_status_code: Option<u16>,
        response_excerpt: Option<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            status: DeliveryStatus::Failed,
            http_status_code,
            response_excerpt,
            error_message: Some(error_message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == DeliveryStatus::Success
    }
}

/// Delivery totals by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryCounts {
    pub total: i64,
    pub successful: i64,
    pub failed: i64,
    pub pending: i64,
}

#[derive(Debug, Clone)]
/// Insert a pending attempt (`attempt_count = 1`).
pub struct InsertPendingDelivery(pub NewDelivery);

impl Processor<InsertPendingDelivery> for DatabaseProcessor {
    type Output = WebhookDelivery;
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertPendingDelivery")]
    async fn process(&self, insert: InsertPendingDelivery) -> Result<WebhookDelivery, StoreError> {
        let InsertPendingDelivery(new) = insert;
        let row: DeliveryRow = sqlx::query_as(
            r#"
            INSERT INTO webhook_deliveries (webhook_id, event_type, payload, status, attempt_count)
            VALUES ($1, $2, $3, $4, 1)
            RETURNING
                id, webhook_id, event_type, payload, status, http_status_code,
                response_excerpt, error_message, attempt_count, next_retry_at,
                created_at, completed_at
            "#,
        )
        .bind(new.webhook_id)
        .bind(EventTypeName::from(new.event_type))
        .bind(new.payload)
        .bind(DeliveryStatus::Pending)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }
}

#[derive(Debug, Clone)]
/// Record the terminal outcome of an attempt and bump the owning webhook's
/// counters in the same transaction.
///
/// The webhook may have been deleted while the request was in flight; the
/// counter update then touches no row and the delivery record is still
/// completed.
pub struct CompleteDelivery {
    pub delivery_id: i64,
    pub webhook_id: i64,
    pub outcome: DeliveryOutcome,
}

impl Processor<CompleteDelivery> for DatabaseProcessor {
    type Output = WebhookDelivery;
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "SQL:CompleteDelivery")]
    async fn process(&self, complete: CompleteDelivery) -> Result<WebhookDelivery, StoreError> {
        let CompleteDelivery {
            delivery_id,
            webhook_id,
            outcome,
        } = complete;
        let succeeded = outcome.is_success();

        let mut tx = self.pool.begin().await?;

        let row: DeliveryRow = sqlx::query_as(
            r#"
            UPDATE webhook_deliveries SET
                status = $2,
                http_status_code = $3,
                response_excerpt = $4,
                error_message = $5,
                completed_at = NOW()
            WHERE id = $1
            RETURNING
                id, webhook_id, event_type, payload, status, http_status_code,
                response_excerpt, error_message, attempt_count, next_retry_at,
                created_at, completed_at
            "#,
        )
        .bind(delivery_id)
        .bind(outcome.status)
        .bind(outcome.http_status_code.map(i32::from))
        .bind(outcome.response_excerpt)
        .bind(outcome.error_message)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE webhooks SET
                success_count = success_count + CASE WHEN $2 THEN 1 ELSE 0 END,
                failure_count = failure_count + CASE WHEN $2 THEN 0 ELSE 1 END,
                last_triggered_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(webhook_id)
        .bind(succeeded)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }
}

#[derive(Debug, Clone, Copy)]
/// Delivery history for one webhook id, newest first.
///
/// Works for ids whose webhook has been deleted.
pub struct ListDeliveriesByWebhook {
    pub webhook_id: i64,
    pub status: Option<DeliveryStatus>,
    pub page: Page,
}

impl ListDeliveriesByWebhook {
    fn push_where(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        qb.push(" WHERE webhook_id = ").push_bind(self.webhook_id);
        if let Some(status) = self.status {
            qb.push(" AND status = ").push_bind(status);
        }
    }
}

impl Processor<ListDeliveriesByWebhook> for DatabaseProcessor {
    type Output = (Vec<WebhookDelivery>, i64);
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "SQL:ListDeliveriesByWebhook")]
    async fn process(
        &self,
        query: ListDeliveriesByWebhook,
    ) -> Result<(Vec<WebhookDelivery>, i64), StoreError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM webhook_deliveries");
        query.push_where(&mut count);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(
            "SELECT id, webhook_id, event_type, payload, status, http_status_code, \
             response_excerpt, error_message, attempt_count, next_retry_at, created_at, \
             completed_at FROM webhook_deliveries",
        );
        query.push_where(&mut select);
        select
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(query.page.limit)
            .push(" OFFSET ")
            .push_bind(query.page.offset);
        let rows = select
            .build_query_as::<DeliveryRow>()
            .fetch_all(&self.pool)
            .await?;

        let items = rows
            .into_iter()
            .map(WebhookDelivery::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((items, total))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CountDeliveries;

#[derive(Debug, sqlx::FromRow)]
struct DeliveryCountsRow {
    total: i64,
    successful: i64,
    failed: i64,
    pending: i64,
}

impl Processor<CountDeliveries> for DatabaseProcessor {
    type Output = DeliveryCounts;
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "SQL:CountDeliveries")]
    async fn process(&self, _: CountDeliveries) -> Result<DeliveryCounts, StoreError> {
        let row: DeliveryCountsRow = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'success') AS successful,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed,
                COUNT(*) FILTER (WHERE status = 'pending') AS pending
            FROM webhook_deliveries
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(DeliveryCounts {
            total: row.total,
            successful: row.successful,
            failed: row.failed,
            pending: row.pending,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_constructors() {
        let ok = DeliveryOutcome::success(204, None);
        assert!(ok.is_success());
        assert_eq!(ok.error_message, None);

        let failed = DeliveryOutcome::failed(Some(500), Some("boom".into()), "HTTP 500");
        assert!(!failed.is_success());
        assert_eq!(failed.status, DeliveryStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("HTTP 500"));
    }
}
