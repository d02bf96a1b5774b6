//! Router configuration for Web API.

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::handlers::{
    count_files, delete_file, download_file, get_file, list_chat_files, list_files,
    rename_file, replace_file, upload_file, AppState,
};
use super::middleware::create_cors_layer;

/// Room for multipart boundaries and the non-file form fields.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Create the main API router.
pub fn create_router(app_state: Arc<AppState>, cors_origins: &[String]) -> Router {
    let max_file_size =
        usize::try_from(app_state.files.config().max_file_size).unwrap_or(usize::MAX);
    let body_limit = max_file_size.saturating_add(MULTIPART_OVERHEAD);

    let file_routes = Router::new()
        .route("/", get(list_files).post(upload_file))
        .route("/count", get(count_files))
        .route(
            "/:id",
            get(get_file)
                .patch(rename_file)
                .put(replace_file)
                .delete(delete_file),
        )
        .route("/:id/download", get(download_file));

    let chat_routes = Router::new().route("/:chat_id/files", get(list_chat_files));

    // API routes
    let api_routes = Router::new()
        .nest("/files", file_routes)
        .nest("/chats", chat_routes);

    Router::new()
        .nest("/api", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(create_cors_layer(cors_origins))
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(app_state)
}

/// Create a health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health_check))
}

/// Health check handler.
async fn health_check() -> &'static str {
    "OK"
}
