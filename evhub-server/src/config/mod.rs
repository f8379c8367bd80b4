//! Configuration module for evhub-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables. Also handles API token hashing.

pub mod file;

use crate::config::file::{ApiTokenConfig, FileConfig};
use evhub_core::config::{
    AdminConfig, ApiToken, ConnectionConfig, DeliveryConfig, ServerConfig, SharedConfig,
};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("token hashing error: {0}")]
    HashError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Loaded configuration result containing all parts.
#[derive(Debug)]
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub admin: AdminConfig,
    pub delivery: DeliveryConfig,
    pub connections: ConnectionConfig,
}

impl LoadedConfig {
    /// Convert into a SharedConfig with Arc<RwLock<T>> wrappers.
    pub fn into_shared(self) -> SharedConfig {
        SharedConfig::new(self.server, self.admin, self.delivery, self.connections)
    }
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI overrides
    /// 3. Validate the configuration
    /// 4. Hash plaintext API tokens (and rewrite the file if any were)
    /// 5. Build the loaded configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&config_content)?;

        self.validate(&file_config)?;

        let mut rehashed = 0usize;
        for token in file_config.api_tokens.iter_mut().filter(|t| !t.is_hashed()) {
            token.token = hash_token(&token.token)?;
            rehashed += 1;
        }
        if rehashed > 0 {
            self.rewrite_config(&file_config)?;
            tracing::info!(
                count = rehashed,
                "API tokens hashed and config file updated"
            );
        }

        // The override is applied after the rewrite so it never lands in the file.
        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        if file_config.api_tokens.is_empty() {
            tracing::warn!(
                "No API tokens configured; the management API and event stream will reject \
                 every request"
            );
        }

        Ok(build_loaded_config(file_config))
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }

    fn validate(&self, config: &FileConfig) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for token in &config.api_tokens {
            if token.name.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "api token name must not be empty".into(),
                ));
            }
            if token.token.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "api token {} has an empty token",
                    token.name
                )));
            }
            if !names.insert(token.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate api token name {}",
                    token.name
                )));
            }
        }

        let positive = [
            ("delivery.timeout_secs", config.delivery.timeout_secs),
            (
                "delivery.max_concurrent",
                config.delivery.max_concurrent as u64,
            ),
            (
                "connections.sweep_interval_secs",
                config.connections.sweep_interval_secs,
            ),
            (
                "connections.keepalive_interval_secs",
                config.connections.keepalive_interval_secs,
            ),
            (
                "connections.write_timeout_secs",
                config.connections.write_timeout_secs,
            ),
            (
                "connections.outbound_buffer",
                config.connections.outbound_buffer as u64,
            ),
        ];
        if let Some((key, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::ValidationError(format!(
                "{key} must be positive"
            )));
        }
        Ok(())
    }

    fn rewrite_config(&self, config: &FileConfig) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(config)?;

        // Write atomically: write to temp file, then rename
        let temp_path = self.config_path.with_extension("toml.tmp");
        std::fs::write(&temp_path, toml_string)?;
        std::fs::rename(&temp_path, &self.config_path)?;

        Ok(())
    }
}

fn hash_token(plaintext: &str) -> Result<String, ConfigError> {
    use argon2::{
        Argon2, PasswordHasher,
        password_hash::{SaltString, rand_core::OsRng},
    };

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ConfigError::HashError(e.to_string()))
}

fn build_loaded_config(file_config: FileConfig) -> LoadedConfig {
    let FileConfig {
        server,
        delivery,
        connections,
        api_tokens,
    } = file_config;

    LoadedConfig {
        server: ServerConfig {
            listen: server.listen,
        },
        admin: AdminConfig::new(api_tokens.into_iter().map(convert_token).collect()),
        delivery: DeliveryConfig {
            timeout: Duration::from_secs(delivery.timeout_secs),
            response_excerpt_limit: delivery.response_excerpt_limit,
            max_concurrent: delivery.max_concurrent,
        },
        connections: ConnectionConfig {
            idle_timeout: (connections.idle_timeout_secs > 0)
                .then(|| Duration::from_secs(connections.idle_timeout_secs)),
            sweep_interval: Duration::from_secs(connections.sweep_interval_secs),
            keepalive_interval: Duration::from_secs(connections.keepalive_interval_secs),
            write_timeout: Duration::from_secs(connections.write_timeout_secs),
            outbound_buffer: connections.outbound_buffer,
        },
    }
}

fn convert_token(t: ApiTokenConfig) -> ApiToken {
    ApiToken {
        name: t.name,
        token_hash: t.token,
    }
}

/// Get the database URL from environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("evhub-config-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn plaintext_tokens_are_hashed_and_file_rewritten() {
        let path = temp_config(
            r#"
[server]
listen = "127.0.0.1:4000"

[[api_tokens]]
name = "ops"
token = "ops-secret"
"#,
        );
        let loader = ConfigLoader::new(&path, Some("127.0.0.1:5000".parse().unwrap()));
        let loaded = loader.load().unwrap();

        assert_eq!(loaded.server.listen.port(), 5000);
        assert_eq!(loaded.admin.authenticate("ops-secret"), Some("ops"));

        let rewritten: FileConfig =
            toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(rewritten.api_tokens[0].is_hashed());
        assert_eq!(rewritten.server.listen.port(), 4000);

        // A second load keeps the existing hash.
        let hash = rewritten.api_tokens[0].token.clone();
        let reloaded = loader.reload().unwrap();
        assert_eq!(reloaded.admin.tokens()[0].token_hash, hash);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn idle_timeout_zero_disables_sweep() {
        let path = temp_config("[connections]\nidle_timeout_secs = 0\n");
        let loaded = ConfigLoader::new(&path, None).load().unwrap();
        assert_eq!(loaded.connections.idle_timeout, None);
        assert_eq!(loaded.delivery.timeout, Duration::from_secs(10));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn invalid_configs_are_rejected() {
        for contents in [
            "[[api_tokens]]\nname = \"a\"\ntoken = \"x\"\n[[api_tokens]]\nname = \"a\"\ntoken = \"y\"\n",
            "[[api_tokens]]\nname = \" \"\ntoken = \"x\"\n",
            "[delivery]\ntimeout_secs = 0\n",
            "[connections]\noutbound_buffer = 0\n",
            "[connections]\nkeepalive_interval_secs = 0\n",
        ] {
            let path = temp_config(contents);
            let result = ConfigLoader::new(&path, None).load();
            assert!(
                matches!(result, Err(ConfigError::ValidationError(_))),
                "{contents}"
            );
            std::fs::remove_file(&path).unwrap();
        }
    }
}
