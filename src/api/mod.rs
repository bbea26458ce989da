//! HTTP adapter: `POST /api/query` plus the prebuilt single-page UI.

mod handlers;
mod router;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::pipeline::Pipeline;

pub use router::build_router;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct ApiContext {
    pub pipeline: Arc<Pipeline>,
}

impl ApiContext {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }
}

/// Serves until Ctrl-C, then drains in-flight requests.
pub async fn serve(ctx: ApiContext, bind: &str, static_dir: &Path) -> Result<()> {
    if !static_dir.join("index.html").exists() {
        warn!(
            "{} has no index.html; only the API will be useful",
            static_dir.display()
        );
    }

    let app = build_router(ctx, static_dir);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
