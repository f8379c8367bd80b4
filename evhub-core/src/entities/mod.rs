pub mod webhook;
pub mod webhook_delivery;

use evhub_sdk::objects::{DeliveryStatus as SdkDeliveryStatus, EventType as SdkEventType};

/// A clamped limit/offset window.
///
/// Construct with [`Page::new`] so both bounds are always in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub fn new(limit: i64, offset: i64) -> Self {
        let (limit, offset) = evhub_sdk::objects::clamp_pagination(limit, offset);
        Self { limit, offset }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(evhub_sdk::objects::DEFAULT_PAGE_LIMIT, 0)
    }
}

/// Event type for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `evhub_sdk::objects::EventType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "webhook_event_type")]
pub enum EventTypeName {
    UserCreated,
    PaymentCompleted,
    TransactionCreated,
    TicketCreated,
    TicketStatusChanged,
    TicketMessageAdded,
}

impl From<EventTypeName> for SdkEventType {
    fn from(value: EventTypeName) -> Self {
        match value {
            EventTypeName::UserCreated => SdkEventType::UserCreated,
            EventTypeName::PaymentCompleted => SdkEventType::PaymentCompleted,
            EventTypeName::TransactionCreated => SdkEventType::TransactionCreated,
            EventTypeName::TicketCreated => SdkEventType::TicketCreated,
            EventTypeName::TicketStatusChanged => SdkEventType::TicketStatusChanged,
            EventTypeName::TicketMessageAdded => SdkEventType::TicketMessageAdded,
        }
    }
}

impl From<SdkEventType> for EventTypeName {
    fn from(value: SdkEventType) -> Self {
        match value {
            SdkEventType::UserCreated => EventTypeName::UserCreated,
            SdkEventType::PaymentCompleted => EventTypeName::PaymentCompleted,
            SdkEventType::TransactionCreated => EventTypeName::TransactionCreated,
            SdkEventType::TicketCreated => EventTypeName::TicketCreated,
            SdkEventType::TicketStatusChanged => EventTypeName::TicketStatusChanged,
            SdkEventType::TicketMessageAdded => EventTypeName::TicketMessageAdded,
        }
    }
}

/// Delivery attempt status for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `evhub_sdk::objects::DeliveryStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "delivery_status")]
pub enum DeliveryStatus {
    Pending,
    Success,
    Failed,
}

impl From<DeliveryStatus> for SdkDeliveryStatus {
    fn from(value: DeliveryStatus) -> Self {
        match value {
            DeliveryStatus::Pending => SdkDeliveryStatus::Pending,
            DeliveryStatus::Success => SdkDeliveryStatus::Success,
            DeliveryStatus::Failed => SdkDeliveryStatus::Failed,
        }
    }
}

impl From<SdkDeliveryStatus> for DeliveryStatus {
    fn from(value: SdkDeliveryStatus) -> Self {
        match value {
            SdkDeliveryStatus::Pending => DeliveryStatus::Pending,
            SdkDeliveryStatus::Success => DeliveryStatus::Success,
            SdkDeliveryStatus::Failed => DeliveryStatus::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_names_map_every_sdk_event_type() {
        for event_type in SdkEventType::ALL {
            let stored = EventTypeName::from(event_type);
            assert_eq!(SdkEventType::from(stored), event_type);
        }
    }

    #[test]
    fn delivery_status_maps_to_the_wire_form() {
        assert_eq!(
            SdkDeliveryStatus::from(DeliveryStatus::Failed).as_str(),
            "failed"
        );
        assert_eq!(
            DeliveryStatus::from(SdkDeliveryStatus::Pending),
            DeliveryStatus::Pending
        );
    }
}
