//! The typed event envelope shared by all producers and consumers.

pub use evhub_sdk::objects::EventType;
use evhub_sdk::objects::{EventFrame, UnknownEventType};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use time::OffsetDateTime;

/// Errors raised while constructing an [`Event`].
///
/// These are the only errors a producer can observe from publishing.
#[derive(Debug, Error)]
pub enum EventError {
    #[error(transparent)]
    UnknownType(#[from] UnknownEventType),

    #[error("event payload must be a JSON object, got {0}")]
    PayloadNotObject(&'static str),

    #[error("event payload could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// An immutable notification of a domain occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    event_type: EventType,
    payload: Map<String, Value>,
    timestamp: OffsetDateTime,
}

impl Event {
    /// Create an event stamped with the current UTC time.
    pub fn new(event_type: EventType, payload: Map<String, Value>) -> Self {
        Self::with_timestamp(event_type, payload, OffsetDateTime::now_utc())
    }

    pub fn with_timestamp(
        event_type: EventType,
        payload: Map<String, Value>,
        timestamp: OffsetDateTime,
    ) -> Self {
        Self {
            event_type,
            payload,
            timestamp,
        }
    }

    /// Build an event from an untyped name and JSON payload.
    pub fn parse(event_type: &str, payload: Value) -> Result<Self, EventError> {
        let event_type: EventType = event_type.parse()?;
        match payload {
            Value::Object(map) => Ok(Self::new(event_type, map)),
            other => Err(EventError::PayloadNotObject(json_kind(&other))),
        }
    }

    /// Build an event from any serializable payload struct.
    pub fn from_serializable<T: Serialize>(
        event_type: EventType,
        payload: &T,
    ) -> Result<Self, EventError> {
        match serde_json::to_value(payload)? {
            Value::Object(map) => Ok(Self::new(event_type, map)),
            other => Err(EventError::PayloadNotObject(json_kind(&other))),
        }
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    pub fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }

    /// The WebSocket frame broadcast for this event.
    pub fn to_frame(&self) -> EventFrame {
        EventFrame {
            event_type: self.event_type,
            payload: self.payload.clone(),
            timestamp: self.timestamp,
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
