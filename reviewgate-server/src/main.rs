use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, Level};

use reviewgate_core::{
    Clock, InMemoryRepository, ItemRepository, LockManager, LogPublishSink, ReviewApi,
    ReviewItemStore, SqliteRepository, SystemClock,
};
use reviewgate_server::config::{Config, StorageBackend};
use reviewgate_server::sweeper::lock_sweep_loop;
use reviewgate_server::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting review gate service");

    let config = Config::from_env().context("Failed to load configuration from environment")?;

    let repository: Arc<dyn ItemRepository> = match config.storage {
        StorageBackend::Sqlite => {
            let db_path = config.database_path();
            info!("Using state database: {}", db_path.display());
            Arc::new(
                SqliteRepository::new(&db_path).context("Failed to initialize SQLite database")?,
            )
        }
        StorageBackend::Memory => {
            info!("Using in-memory storage; items are lost on restart");
            Arc::new(InMemoryRepository::new())
        }
    };

    let store = Arc::new(ReviewItemStore::new(repository));
    info!("Loaded {} work item(s)", store.count().await?);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let locks = Arc::new(LockManager::with_ttl(clock.clone(), config.lock_ttl));
    info!("Lock TTL is {}s", config.lock_ttl.as_secs());

    let api = Arc::new(ReviewApi::new(
        store,
        locks.clone(),
        clock,
        Arc::new(LogPublishSink),
    ));

    if config.api_auth_token.is_none() {
        info!("API_AUTH_TOKEN not set; /api routes are open");
    }

    let app_state = Arc::new(AppState {
        api,
        auth_token: config.api_auth_token.clone(),
    });

    let sweep_every = config.lock_sweep_interval;
    tokio::spawn(async move {
        lock_sweep_loop(locks, sweep_every).await;
    });

    let app = build_router(app_state);

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
