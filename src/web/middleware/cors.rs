//! CORS middleware configuration.

use axum::http::header::{ACCEPT, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};

/// Create a CORS layer from configuration.
///
/// Downloads expose `Content-Disposition` so browsers can read the filename.
pub fn create_cors_layer(origins: &[String]) -> CorsLayer {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::PATCH,
        Method::OPTIONS,
    ];

    let parsed_origins: Vec<HeaderValue> =
        origins.iter().filter_map(|o| o.parse().ok()).collect();

    let layer = CorsLayer::new()
        .allow_methods(methods)
        .expose_headers([CONTENT_DISPOSITION, CONTENT_LENGTH]);

    if parsed_origins.is_empty() {
        // No (valid) origins configured: allow any origin
        layer.allow_headers(Any).allow_origin(Any)
    } else {
        layer
            .allow_headers([CONTENT_TYPE, ACCEPT])
            .allow_origin(parsed_origins)
    }
}
