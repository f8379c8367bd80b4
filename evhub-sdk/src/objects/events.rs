//! Event type enumeration shared by producers, the server and receivers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A recognised domain event type.
///
/// Serialized as its dot-namespaced name (`"user.created"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "user.created")]
    UserCreated,
    #[serde(rename = "payment.completed")]
    PaymentCompleted,
    #[serde(rename = "transaction.created")]
    TransactionCreated,
    #[serde(rename = "ticket.created")]
    TicketCreated,
    #[serde(rename = "ticket.status_changed")]
    TicketStatusChanged,
    #[serde(rename = "ticket.message_added")]
    TicketMessageAdded,
}

/// The two independent delivery channels an event can fan out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryChannel {
    /// Live push to authenticated admin-UI sessions.
    WebSocket,
    /// Signed HTTP POST to registered third-party endpoints.
    Webhook,
}

impl EventType {
    pub const ALL: [EventType; 6] = [
        EventType::UserCreated,
        EventType::PaymentCompleted,
        EventType::TransactionCreated,
        EventType::TicketCreated,
        EventType::TicketStatusChanged,
        EventType::TicketMessageAdded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::UserCreated => "user.created",
            EventType::PaymentCompleted => "payment.completed",
            EventType::TransactionCreated => "transaction.created",
            EventType::TicketCreated => "ticket.created",
            EventType::TicketStatusChanged => "ticket.status_changed",
            EventType::TicketMessageAdded => "ticket.message_added",
        }
    }

    /// Whether events of this type are carried by `channel`.
    ///
    /// Ticket status changes and ticket messages only go to live sessions.
    pub fn allowed_on(&self, channel: DeliveryChannel) -> bool {
        match channel {
            DeliveryChannel::WebSocket => true,
            DeliveryChannel::Webhook => !matches!(
                self,
                EventType::TicketStatusChanged | EventType::TicketMessageAdded
            ),
        }
    }

    /// Event types a webhook subscription may register for.
    pub fn webhook_types() -> impl Iterator<Item = EventType> {
        Self::ALL
            .into_iter()
            .filter(|t| t.allowed_on(DeliveryChannel::Webhook))
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing a string that names no recognised event type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event type: {0}")]
pub struct UnknownEventType(pub String);

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownEventType(s.to_owned()))
    }
}

/// Body of `POST /events`, used by out-of-process producers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishEventRequest {
    pub event_type: String,
    pub payload: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_from_str() {
        for t in EventType::ALL {
            assert_eq!(t.as_str().parse::<EventType>(), Ok(t));
            assert_eq!(
                serde_json::to_string(&t).unwrap(),
                format!("\"{}\"", t.as_str())
            );
        }
        assert!("user.deleted".parse::<EventType>().is_err());
    }

    #[test]
    fn ticket_updates_are_websocket_only() {
        let webhook: Vec<_> = EventType::webhook_types().collect();
        assert_eq!(
            webhook,
            vec![
                EventType::UserCreated,
                EventType::PaymentCompleted,
                EventType::TransactionCreated,
                EventType::TicketCreated,
            ]
        );
        assert!(EventType::TicketMessageAdded.allowed_on(DeliveryChannel::WebSocket));
    }
}
