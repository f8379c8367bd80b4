//! Event bus channel factory and handles.

use std::sync::Arc;

use super::types::Event;
use tokio::sync::mpsc;

/// Default buffer size for the event bus.
///
/// This provides enough buffer to handle bursts while keeping memory bounded.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Sender half of the event bus, held by [`crate::processors::EventDispatcher`].
pub type EventSender = mpsc::Sender<Arc<Event>>;
/// Receiver half of the event bus, drained by [`crate::processors::DispatchWorker`].
pub type EventReceiver = mpsc::Receiver<Arc<Event>>;

/// Create a new event bus channel.
///
/// Multiple senders can be cloned from the returned sender.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}
