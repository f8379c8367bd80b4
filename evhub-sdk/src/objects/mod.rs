pub mod events;
pub mod webhook;
pub mod ws;

pub use events::{DeliveryChannel, EventType, PublishEventRequest, UnknownEventType};
pub use webhook::{
    CreateWebhookRequest, DeliveryListResponse, DeliveryResponse, DeliveryStatus,
    ListDeliveriesQuery, ListWebhooksQuery, UpdateWebhookRequest, WebhookListResponse,
    WebhookResponse, WebhookStatsResponse, DEFAULT_PAGE_LIMIT, clamp_pagination,
};
pub use ws::{ControlFrame, EventFrame, WsClientMessage, WsServerMessage};
