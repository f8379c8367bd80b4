//! TOML file configuration structures.
//!
//! These structs directly map to the `evhub-config.toml` file format.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub connections: ConnectionsConfig,
    #[serde(default)]
    pub api_tokens: Vec<ApiTokenConfig>,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// One management credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiTokenConfig {
    /// Principal name reported in logs.
    pub name: String,
    /// The token. If this is plaintext (doesn't start with `$argon2`),
    /// it will be hashed and the config file will be rewritten.
    pub token: String,
}

impl ApiTokenConfig {
    pub fn is_hashed(&self) -> bool {
        self.token.starts_with("$argon2")
    }
}

/// Outbound webhook settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_excerpt_limit")]
    pub response_excerpt_limit: usize,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            response_excerpt_limit: default_excerpt_limit(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_excerpt_limit() -> usize {
    1024
}

fn default_max_concurrent() -> usize {
    64
}

/// Live event-stream settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionsConfig {
    /// `0` disables idle detection.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_keepalive_interval_secs")]
    pub keepalive_interval_secs: u64,
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

impl Default for ConnectionsConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            keepalive_interval_secs: default_keepalive_interval_secs(),
            write_timeout_secs: default_write_timeout_secs(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

fn default_idle_timeout_secs() -> u64 {
    90
}

fn default_sweep_interval_secs() -> u64 {
    15
}

fn default_keepalive_interval_secs() -> u64 {
    30
}

fn default_write_timeout_secs() -> u64 {
    10
}

fn default_outbound_buffer() -> usize {
    64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config_parsing() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:3000"

[delivery]
timeout_secs = 5
response_excerpt_limit = 256

[connections]
idle_timeout_secs = 0
outbound_buffer = 8

[[api_tokens]]
name = "dashboard"
token = "plain-token"

[[api_tokens]]
name = "billing"
token = "$argon2id$v=19$m=19456,t=2,p=1$abc123$def456"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 3000);
        assert_eq!(config.delivery.timeout_secs, 5);
        assert_eq!(config.delivery.response_excerpt_limit, 256);
        assert_eq!(config.delivery.max_concurrent, 64);
        assert_eq!(config.connections.idle_timeout_secs, 0);
        assert_eq!(config.connections.sweep_interval_secs, 15);
        assert_eq!(config.connections.keepalive_interval_secs, 30);
        assert_eq!(config.api_tokens.len(), 2);
        assert!(!config.api_tokens[0].is_hashed());
        assert!(config.api_tokens[1].is_hashed());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.listen, default_listen_addr());
        assert_eq!(config.delivery.timeout_secs, 10);
        assert_eq!(config.delivery.response_excerpt_limit, 1024);
        assert_eq!(config.connections.write_timeout_secs, 10);
        assert!(config.api_tokens.is_empty());
    }
}
