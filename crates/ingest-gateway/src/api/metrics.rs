use crate::context::AppContext;
use axum::{extract::State, http::StatusCode, routing::get, Router};
use std::sync::Arc;
use tracing::error;

/// Prometheus scrape endpoint plus a liveness probe.
pub fn create_metrics_api(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_check))
        .with_state(ctx)
}

async fn metrics_handler(State(ctx): State<Arc<AppContext>>) -> Result<String, StatusCode> {
    ctx.render_metrics().map_err(|e| {
        error!(error = %e, "failed to encode metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

async fn health_check() -> &'static str {
    "ok"
}
