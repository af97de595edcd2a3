//! ==============================================================================
//! main.rs - environmental analytics dashboard entry point
//! ==============================================================================
//!
//! purpose:
//!     serves time-series environmental measurements (temperature, humidity,
//!     co2) from a mongodb collection, plus the browser dashboard that charts
//!     them.
//!
//! responsibilities:
//!     - load configuration (dashboard.toml + environment overrides)
//!     - open the measurement store once and hand it down to the handlers
//!     - bootstrap an empty store with dummy data
//!     - serve the rest api and the static dashboard
//!     - close the store after a graceful shutdown
//!
//! architecture:
//!
//!     ┌──────────────┐    ┌──────────────┐    ┌──────────────────────┐
//!     │  dashboard   │───▶│  server.rs   │───▶│ query.rs / seed.rs   │
//!     │  (static/)   │    │  (axum)      │    └──────────┬───────────┘
//!     └──────────────┘    └──────────────┘               │
//!                                                        ▼
//!                                             ┌──────────────────────┐
//!                                             │ store (mongo/memory) │
//!                                             └──────────────────────┘
//!
//!     the store is the only stateful component; everything above it is
//!     stateless request handling.
//!
//! ==============================================================================

mod config;
mod domain;
mod query;
mod seed;
mod server;
mod store;

use anyhow::{Context, Result};
use config::{DashboardConfig, StoreBackend};
use seed::BootstrapOutcome;
use std::sync::Arc;
use store::{MemoryStore, MongoStore, SharedStore};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // startup banner
    println!("===========================================================");
    println!("  Environmental Analytics Dashboard v{}", env!("CARGO_PKG_VERSION"));
    println!("===========================================================");

    // step 1: load configuration
    let config = DashboardConfig::load_or_default()?;
    config.print_summary();

    // step 2: logging (RUST_LOG wins over the configured level)
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("Invalid log level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // step 3: open the store
    let store = open_store(&config).await?;
    prepare_store(&store, &config).await;

    // step 4: web server
    let state = server::AppState::new(store.clone(), config.frontend.clone());
    let app = server::router(state, &config.server.static_dir);

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;

    tracing::info!("Server running on http://{}", address);
    tracing::info!("API Health: http://{}/api/health", address);
    tracing::info!("API endpoints:");
    tracing::info!("   GET  /api/measurements");
    tracing::info!("   GET  /api/measurements/metrics");
    tracing::info!("   POST /api/measurements/seed");

    let served = server::run_server(listener, app, shutdown_signal()).await;

    // step 5: release the connection pool whether or not serving failed
    store.close().await;
    tracing::info!("Shutdown complete");
    served
}

async fn open_store(config: &DashboardConfig) -> Result<SharedStore> {
    let store: SharedStore = match config.database.backend {
        StoreBackend::Mongo => Arc::new(
            MongoStore::connect(&config.database)
                .await
                .context("Invalid MongoDB connection string")?,
        ),
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    };
    Ok(store)
}

/// connectivity failures are logged, never fatal: requests will report
/// store errors until the database is reachable
async fn prepare_store(store: &SharedStore, config: &DashboardConfig) {
    if let Err(e) = store.prepare().await {
        tracing::error!(backend = store.backend(), "Database connection error: {}", e);
        tracing::warn!("Make sure MongoDB is running or check your connection string");
        return;
    }
    tracing::info!(backend = store.backend(), "Database connected successfully");

    if !config.seed.bootstrap {
        return;
    }
    match seed::bootstrap(store.as_ref()).await {
        Ok(BootstrapOutcome::Seeded(n)) => tracing::info!("Generated {} dummy records", n),
        Ok(BootstrapOutcome::Skipped(existing)) => {
            tracing::info!("Database already has {} records", existing)
        }
        Err(e) => tracing::error!("Error seeding data: {}", e),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to wait for Ctrl+C signal: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
