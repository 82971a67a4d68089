use axum::{
    http::Uri,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

use crate::error::FileServerError;
use crate::handlers::{self, SecureFileServer};

/// Attach the download routes to a host router.
///
/// Mounts `GET <prefix>` and `GET <prefix>{*path}`. Call once per router;
/// axum panics on a second registration of the same paths. Other methods get
/// `405 Method Not Allowed` from the router.
pub fn register<S>(router: Router<S>, server: SecureFileServer) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let prefix = server.config().url_prefix().to_string();
    let wildcard = format!("{}{{*path}}", prefix);

    let handler = move |uri: Uri| {
        let server = server.clone();
        async move { download(server, uri).await }
    };

    let router = router.route(&wildcard, get(handler.clone()));

    // The wildcard does not match an empty tail, so the prefix itself
    // (with and without its trailing slash) needs its own routes.
    let bare = prefix.trim_end_matches('/');
    if bare.is_empty() {
        router.route("/", get(handler))
    } else {
        router
            .route(&prefix, get(handler.clone()))
            .route(bare, get(handler))
    }
}

/// Routes served by the standalone binary.
///
/// `/health` is only mounted when it lies outside the download prefix. With a
/// prefix of `/` every path belongs to the root directory, and a file named
/// `health` must stay downloadable.
pub fn file_routes(server: SecureFileServer) -> Router {
    let shadows_files = server.config().url_prefix() == "/";
    let router = register(Router::new(), server);
    if shadows_files {
        router
    } else {
        router.route("/health", get(handlers::health))
    }
}

async fn download(server: SecureFileServer, uri: Uri) -> Response {
    let path = match urlencoding::decode(uri.path()) {
        Ok(path) => path,
        Err(_) => {
            return FileServerError::InvalidPath("path is not valid UTF-8".to_string())
                .into_response();
        }
    };

    server.serve(&path).await
}
