//! Veilgate control plane entry point

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use veilgate_control::{build_app, AppState};
use veilgate_core::InMemoryControlPlane;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let port: u16 = match std::env::var("PORT") {
        Ok(value) => value
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid value '{}' for PORT", value))?,
        Err(_) => 3000,
    };

    let state = AppState {
        store: Arc::new(InMemoryControlPlane::new()),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("veilgate control plane listening on {}", addr);

    axum::serve(listener, build_app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install shutdown handler: {}", e);
    }
    tracing::info!("Shutdown signal received");
}
