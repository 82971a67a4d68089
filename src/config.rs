use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::handlers::normalize_path;

/// URL prefix the download route is mounted under when none is configured.
pub const DEFAULT_URL_PREFIX: &str = "/files/local/";

/// Settings loaded from the optional TOML config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory to serve files from
    #[serde(default)]
    pub root_dir: Option<PathBuf>,

    /// Request-path prefix stripped before resolution
    #[serde(default = "default_url_prefix")]
    pub url_prefix: String,

    /// `max-age` advertised in Cache-Control (in seconds)
    #[serde(default = "default_cache_max_age")]
    pub cache_max_age: u64,

    /// Read buffer size used while streaming a file (in bytes)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_url_prefix() -> String {
    DEFAULT_URL_PREFIX.to_string()
}

fn default_cache_max_age() -> u64 {
    3600 // 1 hour
}

fn default_chunk_size() -> usize {
    8 * 1024 // 8 KiB
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_dir: None,
            url_prefix: default_url_prefix(),
            cache_max_age: default_cache_max_age(),
            chunk_size: default_chunk_size(),
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Validated, immutable configuration of a [`crate::SecureFileServer`].
///
/// Built once at startup and shared read-only by every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    root_dir: PathBuf,
    url_prefix: String,
    cache_max_age: u64,
    chunk_size: usize,
}

impl ServerConfig {
    /// Build a config for `root_dir`, mounted under `url_prefix`.
    ///
    /// The root is made absolute and normalized. When it already exists it is
    /// also canonicalized so symlinks in its own path are resolved once. A root
    /// that does not exist yet is accepted; requests will see 404 until it
    /// appears.
    pub fn new(root_dir: impl AsRef<Path>, url_prefix: &str) -> Result<Self, ConfigError> {
        let root_dir = root_dir.as_ref();
        if root_dir.as_os_str().is_empty() || root_dir.to_string_lossy().trim().is_empty() {
            return Err(ConfigError::EmptyRoot);
        }

        let absolute = if root_dir.is_absolute() {
            root_dir.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(ConfigError::CurrentDir)?
                .join(root_dir)
        };
        let normalized = normalize_path(&absolute);
        let root_dir = std::fs::canonicalize(&normalized).unwrap_or(normalized);

        Ok(Self {
            root_dir,
            url_prefix: normalize_prefix(url_prefix),
            cache_max_age: default_cache_max_age(),
            chunk_size: default_chunk_size(),
        })
    }

    /// Build a config from file settings, with `root_dir` taking precedence
    /// over the file's own `root_dir`.
    pub fn from_config(root_dir: Option<&Path>, config: &Config) -> Result<Self, ConfigError> {
        let root = root_dir
            .or(config.root_dir.as_deref())
            .ok_or(ConfigError::EmptyRoot)?;

        Self::new(root, &config.url_prefix)?
            .with_cache_max_age(config.cache_max_age)
            .with_chunk_size(config.chunk_size)
    }

    pub fn with_cache_max_age(mut self, seconds: u64) -> Self {
        self.cache_max_age = seconds;
        self
    }

    pub fn with_chunk_size(mut self, bytes: usize) -> Result<Self, ConfigError> {
        if bytes == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        self.chunk_size = bytes;
        Ok(self)
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    pub fn cache_max_age(&self) -> u64 {
        self.cache_max_age
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

/// Force the prefix into `/segment/.../` form; empty becomes `/`.
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", trimmed)
    }
}
