use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tokio::fs;
use tracing::{debug, error, warn};

use crate::config::ServerConfig;
use crate::error::FileServerError;
use crate::stream::DownloadStream;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// File that passed every check and is about to be streamed.
#[derive(Debug)]
pub struct ResolvedFile {
    /// Canonical location on disk
    pub path: PathBuf,
    /// Base name offered to the client
    pub name: String,
    pub size: u64,
    pub content_type: String,
}

// ============================================================================
// Helper functions
// ============================================================================

/// Lexically normalize a path: drop `.`, resolve `..` against the components
/// seen so far and collapse repeated separators. The filesystem is not touched.
///
/// `..` at the root stays at the root, matching how the kernel resolves it.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => result.push(prefix.as_os_str()),
            Component::RootDir => result.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                result.pop();
            }
            Component::Normal(name) => result.push(name),
        }
    }
    result
}

/// Whether an I/O error means the path simply is not there.
///
/// Besides `NotFound` this covers a file used as a directory (`a.txt/b`), an
/// over-long name and a symlink cycle: none of them name an existing file.
pub fn is_missing(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::NotFound || e.raw_os_error().is_some_and(is_missing_errno)
}

#[cfg(unix)]
fn is_missing_errno(code: i32) -> bool {
    code == libc::ENOENT || code == libc::ENOTDIR || code == libc::ENAMETOOLONG || code == libc::ELOOP
}

#[cfg(not(unix))]
fn is_missing_errno(_code: i32) -> bool {
    false
}

/// Map a filesystem error on `path` to 404 or a logged 500.
fn fs_error(path: &Path, fragment: &str, e: io::Error) -> FileServerError {
    if is_missing(&e) {
        return FileServerError::NotFound(fragment.to_string());
    }
    error!("I/O failure on {}: {}", path.display(), e);
    FileServerError::Io {
        path: path.to_path_buf(),
        source: e,
    }
}

/// Check that `candidate` is `root` itself or lies below it.
///
/// The comparison works on whole path components, so `/data/work-evil` is not
/// inside `/data/work` even though the strings share a prefix.
pub fn is_within_root(root: &Path, candidate: &Path) -> bool {
    candidate.starts_with(root)
}

/// Build the `Content-Disposition` value for an attachment download.
///
/// The quoted `filename` is a printable-ASCII fallback; the exact name travels
/// percent-encoded in `filename*` (RFC 6266 / RFC 5987).
pub fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| match c {
            '"' => '\'',
            '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(file_name)
    )
}

// ============================================================================
// SecureFileServer
// ============================================================================

/// Serves regular files below a fixed root directory as attachments.
///
/// Cheap to clone; all clones share the same immutable [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct SecureFileServer {
    config: Arc<ServerConfig>,
}

impl SecureFileServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Strip the URL prefix and leading separators from a request path.
    pub fn relative_fragment<'a>(&self, request_path: &'a str) -> &'a str {
        let prefix = self.config.url_prefix();
        let without_prefix = request_path
            .strip_prefix(prefix)
            .or_else(|| {
                // `/files/local` without the trailing slash names the root.
                let bare = prefix.trim_end_matches('/');
                (!bare.is_empty() && request_path == bare).then_some("")
            })
            .unwrap_or(request_path);
        without_prefix.trim_start_matches('/')
    }

    /// Join a fragment onto the root and check containment.
    ///
    /// Purely lexical: nothing on disk is consulted, so a rejected request
    /// never reaches the filesystem.
    pub fn resolve_path(&self, fragment: &str) -> Result<PathBuf, FileServerError> {
        if fragment.contains('\0') {
            warn!("Path contains null byte");
            return Err(FileServerError::PathTraversal);
        }

        let root = self.config.root_dir();
        let candidate = normalize_path(&root.join(fragment));

        if !is_within_root(root, &candidate) {
            warn!("Path traversal attempt rejected: {:?}", fragment);
            return Err(FileServerError::PathTraversal);
        }

        Ok(candidate)
    }

    /// Run every check on the candidate path and collect its metadata.
    pub async fn resolve_file(&self, fragment: &str) -> Result<ResolvedFile, FileServerError> {
        let path = self.resolve_path(fragment)?;

        let metadata = fs::metadata(&path)
            .await
            .map_err(|e| fs_error(&path, fragment, e))?;

        // A symlink inside the root may still point elsewhere.
        let root = self.config.root_dir();
        let canonical_root = fs::canonicalize(root)
            .await
            .map_err(|e| fs_error(root, fragment, e))?;
        let canonical_path = fs::canonicalize(&path)
            .await
            .map_err(|e| fs_error(&path, fragment, e))?;
        if !is_within_root(&canonical_root, &canonical_path) {
            warn!(
                "Symlink escape attempt: {:?} resolved to {:?} which is outside {:?}",
                path, canonical_path, canonical_root
            );
            return Err(FileServerError::PathTraversal);
        }

        if !metadata.is_file() {
            debug!("Refusing to serve non-regular file: {}", path.display());
            return Err(FileServerError::NotAFile);
        }

        // Name and type follow the requested path, not a symlink target.
        let content_type = mime_guess::from_path(&path)
            .first_or_octet_stream()
            .to_string();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "download".to_string());

        Ok(ResolvedFile {
            path: canonical_path,
            name,
            size: metadata.len(),
            content_type,
        })
    }

    /// Serve `request_path` as an attachment download.
    pub async fn serve(&self, request_path: &str) -> Response {
        match self.try_serve(request_path).await {
            Ok(response) => response,
            Err(e) => e.into_response(),
        }
    }

    /// Open a resolved file, returning the handle and its current size.
    ///
    /// The size comes from the open handle so it matches what will be read.
    pub async fn open(&self, resolved: &ResolvedFile) -> Result<(fs::File, u64), FileServerError> {
        let io_failure = |source: io::Error| {
            error!("Cannot open {}: {}", resolved.path.display(), source);
            FileServerError::Io {
                path: resolved.path.clone(),
                source,
            }
        };

        let file = fs::File::open(&resolved.path).await.map_err(io_failure)?;
        let metadata = file.metadata().await.map_err(io_failure)?;
        Ok((file, metadata.len()))
    }

    async fn try_serve(&self, request_path: &str) -> Result<Response, FileServerError> {
        let fragment = self.relative_fragment(request_path);
        let resolved = self.resolve_file(fragment).await?;
        let (file, file_size) = self.open(&resolved).await?;

        debug!("Streaming file: {} ({} bytes)", resolved.path.display(), file_size);

        let disposition = content_disposition(&resolved.name);
        let cache_control = format!("public, max-age={}", self.config.cache_max_age());

        let stream = DownloadStream::new(file, resolved.path, file_size, self.config.chunk_size());
        let body = Body::from_stream(stream);

        Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, resolved.content_type),
                (header::CONTENT_LENGTH, file_size.to_string()),
                (header::CONTENT_DISPOSITION, disposition),
                (header::CACHE_CONTROL, cache_control),
            ],
            body,
        )
            .into_response())
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
