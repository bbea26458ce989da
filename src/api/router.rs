use std::path::Path;

use axum::Router;
use axum::routing::post;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use super::ApiContext;
use super::handlers::{method_not_allowed, query_handler};

/// API routes, with every other path served from `static_dir` and unknown
/// paths falling back to its `index.html`.
pub fn build_router(ctx: ApiContext, static_dir: &Path) -> Router {
    let spa = ServeDir::new(static_dir).fallback(ServeFile::new(static_dir.join("index.html")));

    Router::new()
        .route(
            "/api/query",
            post(query_handler).fallback(method_not_allowed),
        )
        .with_state(ctx)
        .fallback_service(spa)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
