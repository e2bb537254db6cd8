//! Gatherly HTTP server.

use std::sync::Arc;

use gatherly_core::SystemClock;
use gatherly_server::{AppState, GatherlyConfig, GatheringRegistry, build_router};
use gatherly_testing::InMemoryEventStore;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env is optional; real deployments set the environment directly.
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gatherly=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Gatherly RSVP server");

    let config = GatherlyConfig::from_env();
    info!(
        address = %config.server.bind_address(),
        command_timeout = ?config.command_timeout,
        "Configuration loaded"
    );

    // Single-process deployment: the in-memory event store is the system of
    // record for this instance's lifetime.
    let event_store = Arc::new(InMemoryEventStore::new());
    let registry = Arc::new(GatheringRegistry::new(event_store, Arc::new(SystemClock)));

    let state = AppState::new(Arc::clone(&registry), config.command_timeout);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.server.bind_address()).await?;
    info!(address = %config.server.bind_address(), "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Draining gathering stores");
    registry.shutdown(config.shutdown_timeout).await?;
    info!("Server stopped");
    Ok(())
}

#[allow(clippy::expect_used)] // Signal handler installation failing is unrecoverable
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        () = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
