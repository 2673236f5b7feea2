//! Error types for mcpcheck operations.
//!
//! This module defines [`McpCheckError`], the session-level error type, and a
//! [`Result`] type alias for convenience.
//!
//! # Error Handling Strategy
//!
//! - Phase failures (spawn errors, timeouts, non-zero exits, store
//!   inconsistencies) are data, recorded on a `PhaseResult`. They never
//!   surface as `McpCheckError`.
//! - `McpCheckError` is reserved for conditions that stop a whole session:
//!   invalid configuration, an unreadable catalog, an unreachable store.
//! - Use `anyhow::Error` (via `McpCheckError::Other`) for unexpected errors
//!   at file and serialization edges.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for mcpcheck operations.
#[derive(Debug, Error)]
pub enum McpCheckError {
    /// Configuration file not found at expected location.
    #[error("Configuration not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Failed to parse configuration file.
    #[error("Failed to parse config at {path}: {message}")]
    ConfigParseError { path: PathBuf, message: String },

    /// Invalid configuration structure or values.
    #[error("Invalid configuration: {message}")]
    ConfigValidationError { message: String },

    /// The subject catalog could not be read or understood.
    #[error("Catalog error: {message}")]
    CatalogError { message: String },

    /// The attempt store cannot be reached; nothing can be verified.
    #[error("Store unreachable: {message}")]
    StoreUnreachable { message: String },

    /// A single store request failed.
    #[error("Store {operation} failed: {message}")]
    StoreRequest { operation: String, message: String },

    /// The operator stopped the session.
    #[error("Session aborted by operator")]
    Aborted,

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic wrapped error for anyhow interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl McpCheckError {
    /// Build a store request error for the named operation.
    pub fn store(operation: &str, message: impl Into<String>) -> Self {
        Self::StoreRequest {
            operation: operation.to_string(),
            message: message.into(),
        }
    }
}

/// Result type alias for mcpcheck operations.
pub type Result<T> = std::result::Result<T, McpCheckError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_not_found_displays_path() {
        let err = McpCheckError::ConfigNotFound {
            path: PathBuf::from("/foo/config.yml"),
        };
        assert!(err.to_string().contains("/foo/config.yml"));
    }

    #[test]
    fn config_parse_error_displays_path_and_message() {
        let err = McpCheckError::ConfigParseError {
            path: PathBuf::from("/config.yml"),
            message: "invalid syntax".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/config.yml"));
        assert!(msg.contains("invalid syntax"));
    }

    #[test]
    fn store_unreachable_displays_message() {
        let err = McpCheckError::StoreUnreachable {
            message: "connection refused".into(),
        };
        assert_eq!(err.to_string(), "Store unreachable: connection refused");
    }

    #[test]
    fn store_helper_names_operation() {
        let err = McpCheckError::store("insert", "HTTP 500");
        assert_eq!(err.to_string(), "Store insert failed: HTTP 500");
    }

    #[test]
    fn io_error_converts_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: McpCheckError = io_err.into();
        assert!(matches!(err, McpCheckError::Io(_)));
    }

    #[test]
    fn anyhow_error_is_transparent() {
        let err: McpCheckError = anyhow::anyhow!("boom").into();
        assert_eq!(err.to_string(), "boom");
    }
}
