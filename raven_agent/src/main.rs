//! raven_agent binary: serves the status API and WebSocket feed on 0.0.0.0.

use anyhow::Context;
use raven_agent::api;
use raven_agent::config::AgentConfig;
use raven_agent::logging::init_logging;
use raven_agent::state::AppState;
use std::net::SocketAddr;
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AgentConfig::from_env().context("failed to read configuration")?;
    let _guards = init_logging(&config.log_dir, Level::INFO);

    let port = config.port;
    info!(
        data_dir = %config.data_dir.display(),
        interval = ?config.broadcast_interval,
        "starting raven_agent"
    );

    let (state, broadcaster_task) = AppState::for_host(config);
    let app = api::router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(
        "NoC Raven agent running at http://{}",
        listener.local_addr()?
    );

    // one snapshot up front so the log shows what the appliance looks like at boot
    let initial = state.aggregator.build_snapshot().await;
    info!(services = ?initial.services, "initial status");

    // stopping the broadcaster ends every open WebSocket so the drain can finish
    let broadcaster = state.broadcaster.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            broadcaster.shutdown();
        })
        .await
        .context("server error")?;

    let _ = broadcaster_task.await;
    info!("raven_agent stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("ctrl-c handler unavailable: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable: {e}");
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
    info!("shutdown signal received");
}
