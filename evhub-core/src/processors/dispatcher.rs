//! EventDispatcher and its worker.
//!
//! Producers hold a cloneable [`EventDispatcher`]. Publishing only enqueues
//! the event on the bus; it never waits for a delivery and never reports a
//! delivery failure. It does report a bus that no longer accepts events, so
//! ingress can refuse work during shutdown. The [`DispatchWorker`] takes events off the bus in
//! publication order and hands each one to the live broadcast and then to
//! the webhook sender.

use std::sync::Arc;

use crate::events::{Event, EventError, EventReceiver, EventSender, event_channel};
use crate::processors::{ConnectionManager, WebhookSender};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Invalid(#[from] EventError),
    /// The worker has shut down and the event was not queued.
    #[error("event dispatcher has stopped")]
    Stopped,
}

#[derive(Clone)]
pub struct EventDispatcher {
    event_tx: EventSender,
}

impl EventDispatcher {
    /// Create a dispatcher handle and the worker that drains it.
    pub fn new(connections: ConnectionManager, webhooks: WebhookSender) -> (Self, DispatchWorker) {
        let (event_tx, event_rx) = event_channel();
        (
            Self { event_tx },
            DispatchWorker {
                event_rx,
                connections,
                webhooks,
            },
        )
    }

    /// Queue an event for delivery.
    ///
    /// Waits only for bus capacity. Fails with [`PublishError::Stopped`] once
    /// the worker has begun shutting down.
    pub async fn publish(&self, event: Event) -> Result<(), PublishError> {
        let event_type = event.event_type();
        if self.event_tx.send(Arc::new(event)).await.is_err() {
            warn!(%event_type, "Dispatcher stopped, refusing event");
            return Err(PublishError::Stopped);
        }
        Ok(())
    }

    /// Validate an untyped event and queue it.
    ///
    /// Delivery outcomes are never reported here.
    pub async fn publish_json(&self, event_type: &str, payload: Value) -> Result<(), PublishError> {
        let event = Event::parse(event_type, payload)?;
        self.publish(event).await
    }
}

pub struct DispatchWorker {
    event_rx: EventReceiver,
    connections: ConnectionManager,
    webhooks: WebhookSender,
}

impl DispatchWorker {
    /// Run until shutdown is signalled or every dispatcher handle is dropped.
    ///
    /// On shutdown, events already queued are still fanned out and in-flight
    /// webhook deliveries are awaited before returning.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("DispatchWorker started");

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("DispatchWorker received shutdown signal");
                        break;
                    }
                }

                Some(event) = self.event_rx.recv() => {
                    self.fan_out(event).await;
                }

                else => {
                    info!("Event channel closed");
                    break;
                }
            }
        }

        self.event_rx.close();
        while let Some(event) = self.event_rx.recv().await {
            self.fan_out(event).await;
        }

        self.webhooks.shutdown().await;
        info!("DispatchWorker shutdown complete");
    }

    async fn fan_out(&self, event: Arc<Event>) {
        debug!(event_type = %event.event_type(), "Dispatching event");
        self.connections.broadcast(&event).await;
        self.webhooks.dispatch(event).await;
    }
}
