//! cutlist-server - REST API server binary.

use std::net::SocketAddr;

use cutlist_core::config::PipelineConfig;
use cutlist_core::session::spawn_sweeper;
use cutlist_server::{create_server, AppState};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive(Level::INFO.into())
                .add_directive("cutlist_server=debug".parse()?),
        )
        .init();

    let host = std::env::var("CUTLIST_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("CUTLIST_PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    let config = PipelineConfig::load()?;
    let sweep_interval = config.session.sweep_interval();
    let state = AppState::from_config(config)?;

    // Reap expired parse sessions in the background
    let shutdown = CancellationToken::new();
    let sweeper = spawn_sweeper(state.tracker(), sweep_interval, shutdown.clone());
    info!(interval_secs = sweep_interval.as_secs(), "Session sweeper started");

    let app = create_server(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Starting cutlist-server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            info!("Shutdown signal received, stopping sweeper...");
        })
        .await?;

    shutdown.cancel();
    sweeper.await?;

    info!("Server stopped cleanly");
    Ok(())
}
