//! Shared wire types for the evhub event fan-out service.
//!
//! - [`objects`]: event types, webhook management DTOs and WebSocket frames.
//! - [`signature`]: canonical JSON and the `X-Webhook-Signature` scheme.
//! - [`client`] (feature `client`): HTTP and WebSocket clients plus a
//!   receiver-side signature check.

pub mod objects;
pub mod signature;

#[cfg(feature = "client")]
pub mod client;
