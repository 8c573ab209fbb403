//! IAM Cache - JWKS and OIDC discovery caching server
//!
//! Serves cached identity provider documents and JWT signature verification
//! over HTTP.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::{signal, task::JoinHandle};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iam_cache::{create_router, spawn_cleanup_task, spawn_warm_task, AppState, Config};

/// Main entry point for the IAM cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the caches, opening the persistent tier when configured
/// 4. Start the background purge task and, optionally, discovery warming
/// 5. Create Axum router with all endpoints
/// 6. Start HTTP server on configured port
/// 7. Handle graceful shutdown on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "iam_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting IAM cache server");

    let config = Config::from_env();
    info!(
        port = config.server_port,
        storage_dir = ?config.storage_dir,
        max_entries = config.max_entries,
        cleanup_interval = config.cleanup_interval,
        "Configuration loaded"
    );

    let state = AppState::from_config(&config).context("failed to build HTTP client")?;
    info!("Caches initialized");

    let mut background = Vec::new();
    if config.cleanup_interval > 0 {
        background.push(spawn_cleanup_task(
            state.jwks.clone(),
            state.oidc.clone(),
            config.cleanup_interval,
        ));
        info!("Background purge task started");
    }

    if config.warm_oidc_cache {
        let warm = spawn_warm_task(state.oidc.clone(), state.fetcher.clone());
        background.push(tokio::spawn(async move {
            if let Err(e) = warm.await {
                warn!(error = %e, "Discovery warming task did not complete");
            }
        }));
    }

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(background))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// On shutdown signal, aborts the background tasks and allows graceful shutdown.
async fn shutdown_signal(background: Vec<JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    for handle in &background {
        handle.abort();
    }
    warn!(tasks = background.len(), "Background tasks aborted");
}
