//! HTTP API: webhook management, producer ingress and the live event stream.

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

pub mod events;
pub mod extractors;
pub mod webhooks;
mod ws;

/// Build the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(webhooks::router())
        .route("/events", post(events::publish_event))
        .route("/ws", get(ws::event_stream_ws))
}
