//! Error types for hostbridge
//!
//! Process-level failures: IO, configuration, listener setup, logging init.
//! Broker and protocol errors live next to the code that raises them.

use std::path::PathBuf;

/// Main error type for hostbridge operations
#[derive(Debug, thiserror::Error)]
pub enum HostBridgeError {
    // === IO Errors ===

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // === Network Errors ===

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    // === Configuration Errors ===

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    // === Internal Errors ===

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HostBridgeError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type alias using HostBridgeError
pub type Result<T> = std::result::Result<T, HostBridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Display Tests ====================

    #[test]
    fn test_error_display_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = HostBridgeError::Io(io_err);
        assert!(err.to_string().contains("IO error"));
    }

    #[test]
    fn test_error_display_file_read() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "permission denied");
        let err = HostBridgeError::FileRead {
            path: PathBuf::from("/etc/hostbridge.toml"),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.contains("Failed to read file"));
        assert!(msg.contains("/etc/hostbridge.toml"));
    }

    #[test]
    fn test_error_display_bind() {
        let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use");
        let err = HostBridgeError::Bind {
            addr: "127.0.0.1:3333".into(),
            source: io_err,
        };
        assert!(err.to_string().contains("127.0.0.1:3333"));
    }

    #[test]
    fn test_error_display_config() {
        let err = HostBridgeError::config("port must be non-zero");
        assert_eq!(err.to_string(), "Configuration error: port must be non-zero");
    }

    #[test]
    fn test_error_display_config_invalid() {
        let err = HostBridgeError::ConfigInvalid {
            path: PathBuf::from("/home/user/.config/hostbridge/config.toml"),
            message: "syntax error".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Invalid configuration"));
        assert!(msg.contains("config.toml"));
        assert!(msg.contains("syntax error"));
    }

    #[test]
    fn test_error_display_config_not_found() {
        let err = HostBridgeError::ConfigNotFound(PathBuf::from("/missing/config.toml"));
        assert!(err.to_string().contains("/missing/config.toml"));
    }

    #[test]
    fn test_error_display_internal() {
        let err = HostBridgeError::internal("unexpected state");
        assert_eq!(err.to_string(), "Internal error: unexpected state");
    }

    // ==================== Conversion Tests ====================

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err: HostBridgeError = io_err.into();
        assert!(matches!(err, HostBridgeError::Io(_)));
    }
}
