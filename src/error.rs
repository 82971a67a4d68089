use std::path::PathBuf;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Errors raised while handling a download request.
///
/// Every variant is detected before the first body byte is produced, so each
/// one maps to a complete error response.
#[derive(Error, Debug)]
pub enum FileServerError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Path is outside root directory")]
    PathTraversal,

    #[error("Not a regular file")]
    NotAFile,

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while building the server configuration at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Root directory must not be empty")]
    EmptyRoot,

    #[error("Chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("Cannot determine current directory: {0}")]
    CurrentDir(#[source] std::io::Error),

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

impl FileServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            FileServerError::NotFound(_) => StatusCode::NOT_FOUND,
            FileServerError::PathTraversal | FileServerError::NotAFile => StatusCode::FORBIDDEN,
            FileServerError::InvalidPath(_) => StatusCode::BAD_REQUEST,
            FileServerError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            FileServerError::NotFound(_) => "NOT_FOUND",
            FileServerError::PathTraversal => "PATH_TRAVERSAL",
            FileServerError::NotAFile => "NOT_A_FILE",
            FileServerError::InvalidPath(_) => "INVALID_PATH",
            FileServerError::Io { .. } => "IO_ERROR",
        }
    }
}

impl IntoResponse for FileServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        // I/O details can reveal the filesystem layout; the failure site logs
        // them with the path.
        let message = match &self {
            FileServerError::Io { .. } => "Internal server error".to_string(),
            other => other.to_string(),
        };

        let body = ErrorResponse {
            error: message,
            code,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            FileServerError::PathTraversal.status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(FileServerError::NotAFile.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            FileServerError::NotFound("a.txt".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            FileServerError::InvalidPath("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(
            FileServerError::Io {
                path: PathBuf::from("/srv/a.txt"),
                source: io,
            }
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_io_error_body_is_generic() {
        let io = std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "/srv/secret/layout/file.txt: permission denied",
        );
        let response = FileServerError::Io {
            path: PathBuf::from("/srv/secret/layout/file.txt"),
            source: io,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "IO_ERROR");
        assert_eq!(json["error"], "Internal server error");
        assert!(!String::from_utf8_lossy(&body).contains("/srv/secret"));
    }
}
