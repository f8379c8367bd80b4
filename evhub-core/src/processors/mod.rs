//! Event processors for the event-driven architecture.
//!
//! - `EventDispatcher`: handle producers publish through
//! - `DispatchWorker`: drains the bus, feeds both delivery channels
//! - `ConnectionManager`: live WebSocket sessions and broadcast
//! - `WebhookSender`: signed HTTP delivery to subscriptions

pub mod connection_manager;
pub mod dispatcher;
pub mod webhook_sender;

pub use connection_manager::{ConnectionActor, ConnectionManager, Frame, Registration, SessionInfo};
pub use dispatcher::{DispatchWorker, EventDispatcher, PublishError};
pub use webhook_sender::WebhookSender;
