//! WebSocket frame types for the `/ws` live event stream.
//!
//! # Protocol
//!
//! 1. The client connects with `GET /ws?token=...` (or `?api_key=...`).
//!    A bad credential is rejected with HTTP 401 before the upgrade.
//! 2. The server sends a [`ControlFrame::Connection`] frame first.
//! 3. Every broadcast event arrives as an [`EventFrame`]:
//!    `{"type":"user.created","payload":{...},"timestamp":"2026-..."}`.
//! 4. The client may send `{"type":"ping"}` at any time; the server answers
//!    with exactly one `{"type":"pong"}`. Any other client frame is ignored.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use super::events::EventType;

/// Greeting carried by the connection frame.
pub const CONNECTED_MESSAGE: &str = "Connected to event stream";

/// Server-generated control frames, tagged by `"type"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlFrame {
    /// Sent once, immediately after a successful handshake.
    Connection { status: String, message: String },
    /// Reply to a client ping.
    Pong,
}

impl ControlFrame {
    pub fn connected() -> Self {
        ControlFrame::Connection {
            status: "connected".into(),
            message: CONNECTED_MESSAGE.into(),
        }
    }
}

/// A broadcast domain event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub payload: Map<String, Value>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Any frame the server may send.
///
/// Control frames are tried first; a `"type"` naming an event type falls
/// through to [`EventFrame`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WsServerMessage {
    Control(ControlFrame),
    Event(EventFrame),
}

/// Client-to-server frames the server understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsClientMessage {
    Ping,
}
