//! Test utilities and common setup.

use std::path::Path;

use axum::{
    body::Body,
    http::{Method, Request, Response},
    Router,
};
use local_files::{routes, SecureFileServer, ServerConfig};
use tower::ServiceExt;

pub const PREFIX: &str = "/files/local/";

/// Create a test application serving `root` under [`PREFIX`].
pub fn test_app(root: &Path) -> Router {
    let config = ServerConfig::new(root, PREFIX).unwrap();
    routes::file_routes(SecureFileServer::new(config))
}

/// Create a test application with a custom read buffer size.
pub fn test_app_with_chunk_size(root: &Path, chunk_size: usize) -> Router {
    let config = ServerConfig::new(root, PREFIX)
        .unwrap()
        .with_chunk_size(chunk_size)
        .unwrap();
    routes::file_routes(SecureFileServer::new(config))
}

/// Send a request with the given method and raw URI.
pub async fn send(app: Router, method: Method, uri: &str) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .uri(uri)
            .method(method)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

/// Send a GET request for `uri`.
pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri).await
}

/// Collect a response body.
pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), 64 * 1024 * 1024)
        .await
        .unwrap()
        .to_vec()
}
