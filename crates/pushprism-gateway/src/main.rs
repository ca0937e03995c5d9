//! pushprism gateway
//!
//! - API listener: POST|PUT /metrics[/label/value...], GET /metrics
//! - Lifecycle listener: GET /metrics (self-metrics)
//! - Batch scheduler publishing the write side every batch interval

use std::error::Error;
use std::future::IntoFuture;

use tracing_subscriber::{fmt, EnvFilter};

use pushprism_gateway::{app_state, config, router};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "pushprism-gateway failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cfg = config::load()?;
    let api_addr = cfg.gateway.api_addr()?;
    let lifecycle_addr = cfg.gateway.lifecycle_addr()?;

    let api_listener = tokio::net::TcpListener::bind(api_addr).await?;
    let lifecycle_listener = tokio::net::TcpListener::bind(lifecycle_addr).await?;

    let state = app_state::AppState::new(&cfg);
    let mut scheduler = state.aggregates().start();

    let api = router::build_api_router(state.clone());
    let lifecycle = router::build_lifecycle_router(state);

    tracing::info!(%api_addr, %lifecycle_addr, "pushprism-gateway starting");

    let served = tokio::try_join!(
        axum::serve(api_listener, api).into_future(),
        axum::serve(lifecycle_listener, lifecycle).into_future(),
    );
    scheduler.stop().await;
    served?;
    Ok(())
}
