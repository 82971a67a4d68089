//! Secure download handler for files below a local root directory.
//!
//! This crate resolves request paths against a configured root, refuses
//! anything that escapes it, and streams regular files back as attachments.
//! It can be used as a standalone binary or registered on another axum router
//! with [`routes::register`].

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod stream;

pub use config::{Config, ServerConfig};
pub use error::{ConfigError, FileServerError};
pub use handlers::SecureFileServer;
