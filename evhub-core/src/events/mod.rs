//! Event model and the bus channel feeding the dispatcher.
//!
//! # Event Flow
//!
//! 1. A producer calls `EventDispatcher::publish` after its transaction commits
//! 2. The event is queued on the bus channel (`EventSender` -> `EventReceiver`)
//! 3. `DispatchWorker` hands it to the `ConnectionManager` (live broadcast)
//! 4. `DispatchWorker` hands it to the `WebhookSender` (one signed POST per
//!    matching active subscription)
//!
//! Events are immutable once constructed and shared behind `Arc`.

pub mod channels;
pub mod types;

pub use channels::{DEFAULT_CHANNEL_BUFFER, EventReceiver, EventSender, event_channel};
pub use types::{Event, EventError, EventType};
