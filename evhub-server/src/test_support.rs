//! Shared fixtures for handler and socket tests.

use crate::server::build_router;
use crate::state::AppState;
use argon2::password_hash::{PasswordHasher, SaltString, rand_core::OsRng};
use argon2::{Algorithm, Argon2, Params, Version};
use evhub_core::config::{
    AdminConfig, ApiToken, ConnectionConfig, DeliveryConfig, ServerConfig, SharedConfig,
};
use evhub_core::processors::{ConnectionManager, EventDispatcher, WebhookSender};
use evhub_core::store::{MemoryWebhookStore, WebhookStore};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

pub const TEST_TOKEN: &str = "test-token";
pub const TEST_PRINCIPAL: &str = "tester";

fn cheap_hash(plaintext: &str) -> String {
    let params = Params::new(1024, 1, 1, None).unwrap();
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password(plaintext.as_bytes(), &SaltString::generate(&mut OsRng))
        .unwrap()
        .to_string()
}

/// State over an in-memory store with the processors running.
///
/// The processors stop when the test runtime does.
pub async fn test_state() -> AppState {
    let (state, shutdown_tx) = test_state_with(ConnectionConfig::default()).await;
    // Leaked so the processors never see a closed shutdown channel.
    std::mem::forget(shutdown_tx);
    state
}

/// State plus the sender that stops its processors.
async fn test_state_with(connections: ConnectionConfig) -> (AppState, watch::Sender<bool>) {
    let admin = AdminConfig::new(vec![ApiToken {
        name: TEST_PRINCIPAL.to_string(),
        token_hash: cheap_hash(TEST_TOKEN),
    }]);
    let config = SharedConfig::new(
        ServerConfig {
            listen: ([127, 0, 0, 1], 0).into(),
        },
        admin,
        DeliveryConfig::default(),
        connections,
    );
    let store: Arc<dyn WebhookStore> = Arc::new(MemoryWebhookStore::new());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let (connections, actor) = ConnectionManager::new(config.connections.clone());
    tokio::spawn(actor.run(shutdown_rx.clone()));

    let webhooks = WebhookSender::new(store.clone(), config.delivery.clone())
        .await;
    let (dispatcher, worker) = EventDispatcher::new(connections.clone(), webhooks);
    tokio::spawn(worker.run(shutdown_rx));

    (
        AppState::new(store, config, dispatcher, connections),
        shutdown_tx,
    )
}

pub struct TestServer {
    pub base_url: String,
    pub ws_url: String,
    pub state: AppState,
    /// Stops the processors while the HTTP server keeps serving.
    pub shutdown_tx: watch::Sender<bool>,
}

/// Serve the full router on an ephemeral local port.
pub async fn spawn_test_server() -> TestServer {
    spawn_test_server_with(ConnectionConfig::default()).await
}

pub async fn spawn_test_server_with(connections: ConnectionConfig) -> TestServer {
    let (state, shutdown_tx) = test_state_with(connections).await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = build_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    TestServer {
        base_url: format!("http://{addr}"),
        ws_url: format!("ws://{addr}"),
        state,
        shutdown_tx,
    }
}
