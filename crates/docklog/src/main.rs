use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docklog::config::MonitorConfig;
use docklog::docker::DockerSource;
use docklog::server;
use docklog::state::AppState;
use docklog::supervisor::Supervisor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docklog=info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("starting docklog v{}", env!("CARGO_PKG_VERSION"));

    let config = MonitorConfig::load().context("failed to load configuration")?;
    config.validate().context("configuration validation failed")?;
    info!(bind_address = %config.bind_address, "configuration loaded");

    info!(
        "connecting to Docker daemon at {}",
        if config.docker_socket.is_empty() {
            "default socket"
        } else {
            &config.docker_socket
        }
    );
    let source = DockerSource::new(&config.docker_socket, config.tail_lines).map_err(|e| {
        error!("failed to connect to Docker: {e}");
        anyhow::anyhow!(e)
    })?;
    info!("connected to Docker daemon");

    let addr: SocketAddr = config
        .bind_address
        .parse()
        .context("invalid bind address")?;

    let state = AppState::new(Arc::new(source), config);

    let supervisor = Supervisor::new(state.clone());
    tokio::spawn(supervisor.run());
    info!(
        interval_secs = state.config.discovery_interval_secs,
        "container discovery running"
    );

    let app = server::build_router(state.clone());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("failed to bind")?;

    info!("docklog is ready");
    info!("  - WebSocket endpoint: ws://{addr}/ws");
    info!("  - Health check:      http://{addr}/health");

    let shutdown_state = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Propagate the root cancellation: pipelines flush and exit,
            // subscribers are cut off, the discovery loop stops.
            shutdown_state.shutdown.cancel();
        })
        .await
        .context("server error")?;

    info!("shutdown complete");
    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
