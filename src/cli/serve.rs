use crate::api::{ApiState, create_router};
use crate::core::config::AppConfig;
use crate::store::db;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Serves the read API until the process is stopped.
pub async fn run(config: &AppConfig, listen: Option<&str>) -> Result<()> {
    let pool = db::connect(&config.database_url).await?;
    db::ensure_history_schema(&pool).await?;

    let state = Arc::new(ApiState {
        pool,
        fx: config.fx_rates(),
    });

    let addr = listen.unwrap_or(&config.listen_addr);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Read API listening on {}", listener.local_addr()?);

    axum::serve(listener, create_router(state))
        .await
        .context("Read API server failed")
}
