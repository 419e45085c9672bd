use crate::context::AppContext;
use crate::dispatch::DispatchError;
use axum::{
    extract::{DefaultBodyLimit, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use ingest_core::MAX_PAYLOAD_SIZE;
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Ingest routes
pub fn create_rest_api(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/push", post(push))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::max(MAX_PAYLOAD_SIZE))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

#[derive(Debug, Deserialize)]
struct PushQuery {
    topic: Option<String>,
    key: Option<String>,
}

async fn push(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<PushQuery>,
    body: Bytes,
) -> Result<&'static str, ApiError> {
    ctx.dispatcher
        .dispatch(
            query.topic.unwrap_or_default(),
            query.key.unwrap_or_default(),
            body,
        )
        .await?;
    Ok("accepted")
}

async fn health_check() -> &'static str {
    "ok"
}

/// API error types
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unavailable(String),
    Internal(String),
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::InvalidRequest(e) => ApiError::BadRequest(e.to_string()),
            DispatchError::PoolClosed => {
                warn!("rejecting push, gateway is shutting down");
                ApiError::Unavailable(err.to_string())
            }
            DispatchError::Pool(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
