//! evhub server
//!
//! Fans application events out to live WebSocket clients and signed webhook
//! subscriptions.

mod api;
mod config;
mod server;
mod shutdown;
mod state;
#[cfg(test)]
mod test_support;

use clap::Parser;
use config::{ConfigLoader, get_database_url};
use evhub_core::processors::{ConnectionManager, EventDispatcher, WebhookSender};
use evhub_core::store::{MemoryWebhookStore, PgWebhookStore, WebhookStore};
use server::{build_router, run_server};
use shutdown::{shutdown_signal, spawn_config_reload_handler};
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// evhub - event fan-out to WebSocket clients and webhooks
#[derive(Parser, Debug)]
#[command(name = "evhub-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./evhub-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,

    /// Keep subscriptions and delivery history in memory instead of PostgreSQL
    #[arg(long, default_value = "false")]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    // Parse command line arguments
    let args = Args::parse();

    tracing::info!("Starting evhub-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.listen));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;

    let listen_addr = loaded_config.server.listen;
    tracing::info!("Configuration loaded from {:?}", args.config);

    // Convert to shared config with separate locks for each section
    let shared_config = loaded_config.into_shared();

    let (store, db_pool) = if args.in_memory {
        tracing::warn!(
            "Running with the in-memory store; nothing survives a restart"
        );
        let store: Arc<dyn WebhookStore> = Arc::new(MemoryWebhookStore::new());
        (store, None)
    } else {
        let database_url = get_database_url().map_err(|e| {
            tracing::error!("DATABASE_URL environment variable not set");
            e
        })?;

        tracing::info!("Connecting to database...");
        let db_pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&database_url)
            .await
            .map_err(|e| {
                tracing::error!("Failed to connect to database: {}", e);
                e
            })?;
        tracing::info!("Database connection established");

        if args.migrate {
            tracing::info!("Running database migrations...");
            sqlx::migrate!("../migrations")
                .run(&db_pool)
                .await
                .map_err(|e| {
                    tracing::error!("Failed to run migrations: {}", e);
                    e
                })?;
            tracing::info!("Migrations completed successfully");
        }

        let store: Arc<dyn WebhookStore> = Arc::new(PgWebhookStore::new(db_pool.clone()));
        (store, Some(db_pool))
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let (connections, connection_actor) =
        ConnectionManager::new(shared_config.connections.clone());
    let actor_handle = tokio::spawn(connection_actor.run(shutdown_rx.clone()));

    let webhooks = WebhookSender::new(store.clone(), shared_config.delivery.clone())
        .await;
    let (dispatcher, dispatch_worker) = EventDispatcher::new(connections.clone(), webhooks);
    let worker_handle = tokio::spawn(dispatch_worker.run(shutdown_rx));

    // Create application state
    let state = AppState::new(store, shared_config, dispatcher, connections);

    // Spawn config reload handler (listens for SIGHUP)
    let reload_notify = spawn_config_reload_handler(state.clone(), config_loader);

    // Build the router
    let router = build_router(state);

    // Run the server. The drain does not wait on upgraded WebSocket sessions;
    // those are closed by the connection actor below.
    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr, shutdown_signal()).await;

    // Every in-flight request has finished, so no accepted event can miss
    // the dispatcher's final drain.
    let _ = shutdown_tx.send(true);
    tracing::info!("Waiting for in-flight deliveries...");
    if let Err(e) = worker_handle.await {
        tracing::error!("Dispatch worker panicked: {}", e);
    }
    if let Err(e) = actor_handle.await {
        tracing::error!("Connection actor panicked: {}", e);
    }

    // Signal the config reload handler to stop
    reload_notify.notify_one();

    if let Some(db_pool) = db_pool {
        tracing::info!("Closing database connections...");
        db_pool.close().await;
    }
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
