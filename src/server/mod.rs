mod handlers;
mod routes;

pub use routes::create_router;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::db::Database;
use crate::monitor::AlertTargets;
use crate::notify::NotificationQueue;
use crate::webhook::SignatureVerifier;

/// How often replay tokens past their retention are pruned
const TOKEN_CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub verifier: SignatureVerifier,
    pub queue: NotificationQueue,
    pub alerts: AlertTargets,
}

impl AppState {
    pub fn new(
        db: Database,
        verifier: SignatureVerifier,
        queue: NotificationQueue,
        alerts: AlertTargets,
    ) -> Self {
        Self {
            db,
            verifier,
            queue,
            alerts,
        }
    }
}

/// Run the API server
pub async fn run_server(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;

    let db = Database::open(&config.db)
        .with_context(|| format!("Failed to open database at {}", config.db))?;

    let (queue, workers) = NotificationQueue::start(
        config.notifier(),
        config.workers,
        config.queue_capacity,
        config.retry_policy(),
    );

    let state = Arc::new(AppState::new(
        db.clone(),
        config.verifier(),
        queue,
        config.alert_targets(),
    ));

    let cleanup = match config.token_retention_secs() {
        Some(retention) => Some(tokio::spawn(prune_tokens(db, retention))),
        None => {
            tracing::info!("Signature freshness check disabled, webhook tokens are kept");
            None
        }
    };

    let app = create_router(state);

    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(cleanup) = cleanup {
        cleanup.abort();
    }

    // The router (and with it the last queue handle) is gone; let workers drain
    tracing::info!("Draining notification queue");
    workers.join().await;

    Ok(())
}

async fn prune_tokens(db: Database, retention_secs: i64) {
    let mut interval = tokio::time::interval(TOKEN_CLEANUP_INTERVAL);
    loop {
        interval.tick().await;
        match db.cleanup_old_tokens(retention_secs) {
            Ok(0) => {}
            Ok(count) => tracing::info!(count, "Pruned expired webhook tokens"),
            Err(e) => tracing::error!("Failed to prune webhook tokens: {:#}", e),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
