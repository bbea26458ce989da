use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use super::ApiContext;

#[derive(Deserialize)]
struct QueryRequest {
    query: Option<String>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Accepts raw bytes so malformed bodies get the same 400 as a missing query.
pub(crate) async fn query_handler(State(ctx): State<ApiContext>, body: Bytes) -> Response {
    let query = serde_json::from_slice::<QueryRequest>(&body)
        .ok()
        .and_then(|req| req.query)
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty());

    let Some(query) = query else {
        warn!("rejected request without a query");
        return error_response(StatusCode::BAD_REQUEST, "Query is required");
    };

    info!(chars = query.len(), "received query");
    let pipeline = ctx.pipeline.clone();
    let outcome = tokio::task::spawn_blocking(move || pipeline.run(&query)).await;

    match outcome {
        Ok(Ok(result)) => (StatusCode::OK, Json(result)).into_response(),
        Ok(Err(e)) => {
            error!("pipeline failed: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        Err(e) => {
            error!("pipeline task aborted: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "pipeline task aborted")
        }
    }
}

pub(crate) async fn method_not_allowed() -> Response {
    error_response(StatusCode::METHOD_NOT_ALLOWED, "only POST allowed")
}
