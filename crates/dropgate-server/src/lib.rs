pub mod config;
pub mod routes;
pub mod storage;

use axum::Router;
use axum::http::{Method, header::{CONTENT_TYPE, RANGE}};
use axum::routing::{get, post};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::routes::AppState;

/// Builds the full route table, shared between the real binary and
/// integration tests (which drive it via `tower::ServiceExt::oneshot`
/// instead of binding a socket).
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            CONTENT_TYPE,
            RANGE,
            "x-upload-id".parse().unwrap(),
            "x-file-offset".parse().unwrap(),
        ])
        .allow_credentials(false);

    Router::new()
        .route("/", get(routes::root))
        .route("/health", get(routes::health))
        .route("/api/info", get(routes::info))
        .route("/upload/init", post(routes::upload_init))
        .route("/upload/chunk", post(routes::upload_chunk))
        .route("/upload/complete", post(routes::upload_complete))
        .route("/api/file/{fileId}/meta", get(routes::file_meta))
        .route("/api/file/{fileId}", get(routes::file_data))
        .route("/{fileId}", get(routes::serve_file))
        .layer(axum::extract::DefaultBodyLimit::max(4 * 1024 * 1024 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
