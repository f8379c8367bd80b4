//! Validated runtime configuration shared across crates.
//!
//! Loading and parsing the TOML file is the server crate's job. The types
//! here are what the running components read.

mod admin;
mod connections;
mod delivery;
mod server;

pub use admin::{AdminConfig, ApiToken};
pub use connections::ConnectionConfig;
pub use delivery::DeliveryConfig;
pub use server::ServerConfig;

use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared configuration state with separate locks for each section.
///
/// `server` and `connections` are read once at startup. `admin` and
/// `delivery` are swapped on reload and read on every use.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    pub server: Arc<RwLock<ServerConfig>>,
    /// Management API credentials.
    pub admin: Arc<RwLock<AdminConfig>>,
    /// Outbound webhook request settings.
    pub delivery: Arc<RwLock<DeliveryConfig>>,
    pub connections: Arc<ConnectionConfig>,
}

impl SharedConfig {
    pub fn new(
        server: ServerConfig,
        admin: AdminConfig,
        delivery: DeliveryConfig,
        connections: ConnectionConfig,
    ) -> Self {
        Self {
            server: Arc::new(RwLock::new(server)),
            admin: Arc::new(RwLock::new(admin)),
            delivery: Arc::new(RwLock::new(delivery)),
            connections: Arc::new(connections),
        }
    }
}
