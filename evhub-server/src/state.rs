//! Application state shared across all request handlers.

use evhub_core::config::SharedConfig;
use evhub_core::processors::{ConnectionManager, EventDispatcher};
use evhub_core::store::WebhookStore;
use std::sync::Arc;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    /// Subscription and delivery storage.
    pub store: Arc<dyn WebhookStore>,
    /// Runtime configuration (partly reloadable via SIGHUP).
    pub config: SharedConfig,
    pub dispatcher: EventDispatcher,
    pub connections: ConnectionManager,
}

impl AppState {
    pub fn new(
        store: Arc<dyn WebhookStore>,
        config: SharedConfig,
        dispatcher: EventDispatcher,
        connections: ConnectionManager,
    ) -> Self {
        Self {
            store,
            config,
            dispatcher,
            connections,
        }
    }
}
