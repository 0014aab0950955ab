//! Veilgate gateway entry point

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use veilgate_core::{
    HttpAnalyzeBackend, HttpControlPlane, Orchestrator, PiiDetector, Settings,
};
use veilgate_gateway::{build_app, AppState, RateLimiter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env()?;

    let control = Arc::new(HttpControlPlane::new(settings.backend_url.clone()));
    let backend = Arc::new(HttpAnalyzeBackend::new(
        settings.pii_analyzer_url.clone(),
        settings.pii_anonymizer_url.clone(),
    ));
    let detector = Arc::new(PiiDetector::new(Some(backend), settings.fallback_to_regex));

    let limiter = Arc::new(RateLimiter::new(
        settings.rate_limit_window_ms,
        settings.rate_limit_max_requests,
    ));
    let orchestrator = Arc::new(Orchestrator::new(
        settings.clone(),
        control,
        detector,
    ));

    let port = settings.port;
    let state = AppState {
        settings: Arc::new(settings),
        orchestrator,
        limiter,
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("veilgate gateway listening on {}", addr);

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
