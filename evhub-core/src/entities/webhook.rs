use std::collections::BTreeMap;

use crate::entities::{EventTypeName, Page};
use crate::events::EventType;
use crate::framework::DatabaseProcessor;
use crate::store::StoreError;
use evhub_sdk::objects::{CreateWebhookRequest, DeliveryChannel, UpdateWebhookRequest};
use kanau::processor::Processor;
use sqlx::{Postgres, QueryBuilder};
use thiserror::Error;
use time::OffsetDateTime;

pub const MAX_NAME_LEN: usize = 255;
pub const MAX_SECRET_LEN: usize = 128;

/// A registered webhook subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Webhook {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub event_type: EventType,
    pub secret: Option<String>,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub last_triggered_at: Option<OffsetDateTime>,
    pub success_count: i64,
    pub failure_count: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct WebhookRow {
    id: i64,
    name: String,
    url: String,
    event_type: EventTypeName,
    secret: Option<String>,
    description: Option<String>,
    is_active: bool,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    last_triggered_at: Option<OffsetDateTime>,
    success_count: i64,
    failure_count: i64,
}

impl From<WebhookRow> for Webhook {
    fn from(row: WebhookRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            url: row.url,
            event_type: row.event_type.into(),
            secret: row.secret,
            description: row.description,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_triggered_at: row.last_triggered_at,
            success_count: row.success_count,
            failure_count: row.failure_count,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("name must be between 1 and {MAX_NAME_LEN} characters")]
    Name,
    #[error("url must be an absolute http or https URL")]
    Url,
    #[error("secret must be at most {MAX_SECRET_LEN} characters")]
    Secret,
    #[error("unknown event type {0:?}")]
    UnknownEventType(String),
    #[error("event type {0} cannot be delivered by webhook")]
    EventTypeNotDeliverable(EventType),
}

fn validate_name(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();
    let len = name.chars().count();
    if len == 0 || len > MAX_NAME_LEN {
        return Err(ValidationError::Name);
    }
    Ok(name.to_string())
}

fn validate_url(raw: &str) -> Result<String, ValidationError> {
    let raw = raw.trim();
    let parsed = url::Url::parse(raw).map_err(|_| ValidationError::Url)?;
    match parsed.scheme() {
        "http" | "https" if parsed.host().is_some() => Ok(raw.to_string()),
        _ => Err(ValidationError::Url),
    }
}

/// Empty secrets mean "unsigned".
fn validate_secret(secret: Option<String>) -> Result<Option<String>, ValidationError> {
    match secret {
        None => Ok(None),
        Some(s) if s.is_empty() => Ok(None),
        Some(s) if s.chars().count() > MAX_SECRET_LEN => Err(ValidationError::Secret),
        Some(s) => Ok(Some(s)),
    }
}

fn validate_event_type(raw: &str) -> Result<EventType, ValidationError> {
    let event_type: EventType = raw
        .parse()
        .map_err(|_| ValidationError::UnknownEventType(raw.to_string()))?;
    if !event_type.allowed_on(DeliveryChannel::Webhook) {
        return Err(ValidationError::EventTypeNotDeliverable(event_type));
    }
    Ok(event_type)
}

fn normalize_description(description: Option<String>) -> Option<String> {
    description.filter(|d| !d.trim().is_empty())
}

/// A validated webhook ready to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWebhook {
    pub name: String,
    pub url: String,
    pub event_type: EventType,
    pub secret: Option<String>,
    pub description: Option<String>,
}

impl TryFrom<CreateWebhookRequest> for NewWebhook {
    type Error = ValidationError;

    fn try_from(req: CreateWebhookRequest) -> Result<Self, ValidationError> {
        Ok(Self {
            name: validate_name(&req.name)?,
            url: validate_url(&req.url)?,
            event_type: validate_event_type(&req.event_type)?,
            secret: validate_secret(req.secret)?,
            description: normalize_description(req.description),
        })
    }
}

/// A validated partial update. The event type of a webhook is fixed at
/// creation and has no field here.
///
/// `secret` and `description` are tri-state: `None` leaves the column alone,
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookPatch {
    pub name: Option<String>,
    pub url: Option<String>,
    pub secret: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub is_active: Option<bool>,
}

impl TryFrom<UpdateWebhookRequest> for WebhookPatch {
    type Error = ValidationError;

    fn try_from(req: UpdateWebhookRequest) -> Result<Self, ValidationError> {
        Ok(Self {
            name: req.name.as_deref().map(validate_name).transpose()?,
            url: req.url.as_deref().map(validate_url).transpose()?,
            secret: req.secret.map(validate_secret).transpose()?,
            description: req.description.map(normalize_description),
            is_active: req.is_active,
        })
    }
}

impl WebhookPatch {
    /// Apply onto an in-memory webhook. Returns whether anything changed.
    pub fn apply(self, webhook: &mut Webhook) -> bool {
        let before = webhook.clone();
        if let Some(name) = self.name {
            webhook.name = name;
        }
        if let Some(url) = self.url {
            webhook.url = url;
        }
        if let Some(secret) = self.secret {
            webhook.secret = secret;
        }
        if let Some(description) = self.description {
            webhook.description = description;
        }
        if let Some(is_active) = self.is_active {
            webhook.is_active = is_active;
        }
        before != *webhook
    }
}

/// Filters accepted by [`ListWebhooks`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WebhookFilter {
    pub event_type: Option<EventType>,
    pub is_active: Option<bool>,
}

impl WebhookFilter {
    pub fn matches(&self, webhook: &Webhook) -> bool {
        self.event_type.is_none_or(|t| t == webhook.event_type)
            && self.is_active.is_none_or(|a| a == webhook.is_active)
    }

    fn push_where(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        qb.push(" WHERE TRUE");
        if let Some(event_type) = self.event_type {
            qb.push(" AND event_type = ")
                .push_bind(EventTypeName::from(event_type));
        }
        if let Some(is_active) = self.is_active {
            qb.push(" AND is_active = ").push_bind(is_active);
        }
    }
}

/// Aggregate subscription counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookCounts {
    pub total: i64,
    pub active: i64,
    pub by_event_type: BTreeMap<EventType, i64>,
}

// ---------------------------------------------------------------------------
// Processors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
/// Insert a validated webhook and return the stored row.
pub struct InsertWebhook(pub NewWebhook);

impl Processor<InsertWebhook> for DatabaseProcessor {
    type Output = Webhook;
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertWebhook")]
    async fn process(&self, insert: InsertWebhook) -> Result<Webhook, StoreError> {
        let InsertWebhook(new) = insert;
        let row: WebhookRow = sqlx::query_as(
            r#"
            INSERT INTO webhooks (name, url, event_type, secret, description)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING
                id, name, url, event_type, secret, description, is_active,
                created_at, updated_at, last_triggered_at, success_count, failure_count
            "#,
        )
        .bind(new.name)
        .bind(new.url)
        .bind(EventTypeName::from(new.event_type))
        .bind(new.secret)
        .bind(new.description)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }
}

#[derive(Debug, Clone)]
/// List webhooks ordered by id ascending, together with the total number of
/// rows matching the filter.
pub struct ListWebhooks {
    pub filter: WebhookFilter,
    pub page: Page,
}

impl Processor<ListWebhooks> for DatabaseProcessor {
    type Output = (Vec<Webhook>, i64);
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "SQL:ListWebhooks")]
    async fn process(&self, query: ListWebhooks) -> Result<(Vec<Webhook>, i64), StoreError> {
        let ListWebhooks { filter, page } = query;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM webhooks");
        filter.push_where(&mut count);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(
            "SELECT id, name, url, event_type, secret, description, is_active, created_at, \
             updated_at, last_triggered_at, success_count, failure_count FROM webhooks",
        );
        filter.push_where(&mut select);
        select
            .push(" ORDER BY id ASC LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset);
        let rows = select
            .build_query_as::<WebhookRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok((rows.into_iter().map(Webhook::from).collect(), total))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GetWebhookById {
    pub id: i64,
}

impl Processor<GetWebhookById> for DatabaseProcessor {
    type Output = Option<Webhook>;
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "SQL:GetWebhookById")]
    async fn process(&self, query: GetWebhookById) -> Result<Option<Webhook>, StoreError> {
        let row: Option<WebhookRow> = sqlx::query_as(
            r#"
            SELECT
                id, name, url, event_type, secret, description, is_active,
                created_at, updated_at, last_triggered_at, success_count, failure_count
            FROM webhooks
            WHERE id = $1
            "#,
        )
        .bind(query.id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Webhook::from))
    }
}

#[derive(Debug, Clone)]
/// Apply a partial update. `updated_at` only moves when a column changed.
pub struct UpdateWebhook {
    pub id: i64,
    pub patch: WebhookPatch,
}

impl Processor<UpdateWebhook> for DatabaseProcessor {
    type Output = Option<Webhook>;
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "SQL:UpdateWebhook")]
    async fn process(&self, update: UpdateWebhook) -> Result<Option<Webhook>, StoreError> {
        let UpdateWebhook { id, patch } = update;
        let row: Option<WebhookRow> = sqlx::query_as(
            r#"
            WITH patched AS (
                SELECT
                    id,
                    COALESCE($2, name) AS name,
                    COALESCE($3, url) AS url,
                    CASE WHEN $4 THEN $5 ELSE secret END AS secret,
                    CASE WHEN $6 THEN $7 ELSE description END AS description,
                    COALESCE($8, is_active) AS is_active
                FROM webhooks
                WHERE id = $1
                FOR UPDATE
            )
            UPDATE webhooks w SET
                name = p.name,
                url = p.url,
                secret = p.secret,
                description = p.description,
                is_active = p.is_active,
                updated_at = CASE
                    WHEN (w.name, w.url, w.secret, w.description, w.is_active)
                        IS DISTINCT FROM (p.name, p.url, p.secret, p.description, p.is_active)
                    THEN NOW()
                    ELSE w.updated_at
                END
            FROM patched p
            WHERE w.id = p.id
            RETURNING
                w.id, w.name, w.url, w.event_type, w.secret, w.description, w.is_active,
                w.created_at, w.updated_at, w.last_triggered_at, w.success_count,
                w.failure_count
            "#,
        )
        .bind(id)
        .bind(patch.name)
        .bind(patch.url)
        .bind(patch.secret.is_some())
        .bind(patch.secret.flatten())
        .bind(patch.description.is_some())
        .bind(patch.description.flatten())
        .bind(patch.is_active)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Webhook::from))
    }
}

#[derive(Debug, Clone, Copy)]
/// Delete a webhook row. Its delivery records stay behind.
pub struct DeleteWebhook {
    pub id: i64,
}

impl Processor<DeleteWebhook> for DatabaseProcessor {
    type Output = bool;
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "SQL:DeleteWebhook")]
    async fn process(&self, delete: DeleteWebhook) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM webhooks WHERE id = $1")
            .bind(delete.id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Clone, Copy)]
/// Active subscriptions for one event type, in id order.
pub struct ListActiveWebhooksForEvent {
    pub event_type: EventType,
}

impl Processor<ListActiveWebhooksForEvent> for DatabaseProcessor {
    type Output = Vec<Webhook>;
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "SQL:ListActiveWebhooksForEvent")]
    async fn process(
        &self,
        query: ListActiveWebhooksForEvent,
    ) -> Result<Vec<Webhook>, StoreError> {
        let rows: Vec<WebhookRow> = sqlx::query_as(
            r#"
            SELECT
                id, name, url, event_type, secret, description, is_active,
                created_at, updated_at, last_triggered_at, success_count, failure_count
            FROM webhooks
            WHERE event_type = $1 AND is_active = TRUE
            ORDER BY id ASC
            "#,
        )
        .bind(EventTypeName::from(query.event_type))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Webhook::from).collect())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CountWebhooks;

#[derive(Debug, sqlx::FromRow)]
struct EventTypeCountRow {
    event_type: EventTypeName,
    total: i64,
    active: i64,
}

impl Processor<CountWebhooks> for DatabaseProcessor {
    type Output = WebhookCounts;
    type Error = StoreError;
    #[tracing::instrument(skip_all, err, name = "SQL:CountWebhooks")]
    async fn process(&self, _: CountWebhooks) -> Result<WebhookCounts, StoreError> {
        let rows: Vec<EventTypeCountRow> = sqlx::query_as(
            r#"
            SELECT
                event_type,
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE is_active) AS active
            FROM webhooks
            GROUP BY event_type
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = WebhookCounts::default();
        for row in rows {
            counts.total += row.total;
            counts.active += row.active;
            counts
                .by_event_type
                .insert(row.event_type.into(), row.total);
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_request() -> CreateWebhookRequest {
        CreateWebhookRequest {
            name: "  Billing  ".to_string(),
            url: "https://hooks.example.com/in".to_string(),
            event_type: "payment.completed".to_string(),
            secret: Some("s3cret".to_string()),
            description: None,
        }
    }

    #[test]
    fn create_request_is_normalized() {
        let new = NewWebhook::try_from(create_request()).unwrap();
        assert_eq!(new.name, "Billing");
        assert_eq!(new.event_type, EventType::PaymentCompleted);
        assert_eq!(new.secret.as_deref(), Some("s3cret"));
    }

    #[test]
    fn create_request_rejects_bad_fields() {
        let mut req = create_request();
        req.name = "   ".to_string();
        assert_eq!(
            NewWebhook::try_from(req).unwrap_err(),
            ValidationError::Name
        );

        let mut req = create_request();
        req.name = "x".repeat(MAX_NAME_LEN + 1);
        assert_eq!(
            NewWebhook::try_from(req).unwrap_err(),
            ValidationError::Name
        );

        for url in ["not a url", "ftp://example.com/x", "/relative", "mailto:a@b.c"] {
            let mut req = create_request();
            req.url = url.to_string();
            assert_eq!(
                NewWebhook::try_from(req).unwrap_err(),
                ValidationError::Url,
                "{url}"
            );
        }

        let mut req = create_request();
        req.secret = Some("k".repeat(MAX_SECRET_LEN + 1));
        assert_eq!(
            NewWebhook::try_from(req).unwrap_err(),
            ValidationError::Secret
        );
    }

    #[test]
    fn create_request_checks_webhook_allow_list() {
        let mut req = create_request();
        req.event_type = "ticket.status_changed".to_string();
        assert_eq!(
            NewWebhook::try_from(req).unwrap_err(),
            ValidationError::EventTypeNotDeliverable(EventType::TicketStatusChanged)
        );

        let mut req = create_request();
        req.event_type = "order.shipped".to_string();
        assert!(matches!(
            NewWebhook::try_from(req),
            Err(ValidationError::UnknownEventType(_))
        ));
    }

    #[test]
    fn empty_secret_means_unsigned() {
        let mut req = create_request();
        req.secret = Some(String::new());
        assert_eq!(NewWebhook::try_from(req).unwrap().secret, None);
    }

    #[test]
    fn patch_applies_tri_state_fields() {
        let now = OffsetDateTime::now_utc();
        let mut webhook = Webhook {
            id: 1,
            name: "a".into(),
            url: "https://a.example/".into(),
            event_type: EventType::UserCreated,
            secret: Some("k".into()),
            description: Some("d".into()),
            is_active: true,
            created_at: now,
            updated_at: now,
            last_triggered_at: None,
            success_count: 0,
            failure_count: 0,
        };

        let noop = WebhookPatch::default();
        assert!(!noop.apply(&mut webhook));

        let patch = WebhookPatch {
            secret: Some(None),
            is_active: Some(false),
            ..WebhookPatch::default()
        };
        assert!(patch.apply(&mut webhook));
        assert_eq!(webhook.secret, None);
        assert_eq!(webhook.description.as_deref(), Some("d"));
        assert!(!webhook.is_active);
    }
}
