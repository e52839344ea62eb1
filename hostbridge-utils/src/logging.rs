//! Logging infrastructure for hostbridge
//!
//! stdout carries the JSON-RPC protocol, so logs only ever go to stderr
//! and/or a file under the XDG state directory.

use std::sync::Mutex;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{paths, HostBridgeError, Result};

/// Environment variable that overrides the configured log filter
pub const LOG_ENV_VAR: &str = "HOSTBRIDGE_LOG";

/// Default log file name
pub const DEFAULT_LOG_FILE: &str = "hostbridge.log";

/// Log output destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    /// Log to stderr
    Stderr,
    /// Log to file
    File,
    /// Log to both stderr and file
    Both,
}

impl std::str::FromStr for LogOutput {
    type Err = HostBridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stderr" => Ok(Self::Stderr),
            "file" => Ok(Self::File),
            "both" => Ok(Self::Both),
            other => Err(HostBridgeError::config(format!(
                "Unknown log output '{}' (expected stderr, file or both)",
                other
            ))),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Output destination
    pub output: LogOutput,
    /// Log level filter (e.g., "info", "debug", "hostbridge_server=debug,hyper=warn")
    pub filter: String,
    /// Include file/line in logs
    pub file_line: bool,
    /// Optional custom log file name (defaults to "hostbridge.log")
    pub file_name: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            output: LogOutput::Stderr,
            filter: "info".into(),
            file_line: false,
            file_name: None,
        }
    }
}

impl LogConfig {
    /// Config for the broker process
    ///
    /// `HOSTBRIDGE_LOG` wins over `configured_filter`, which wins over "info".
    pub fn server(output: LogOutput, configured_filter: Option<&str>) -> Self {
        let filter = std::env::var(LOG_ENV_VAR)
            .ok()
            .filter(|f| !f.trim().is_empty())
            .or_else(|| configured_filter.map(String::from))
            .unwrap_or_else(|| "info".into());

        Self {
            output,
            filter,
            file_line: true,
            file_name: None,
        }
    }
}

/// Initialize logging with custom configuration
pub fn init_logging_with_config(config: LogConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.filter)
        .map_err(|e| HostBridgeError::config(format!("Invalid log filter: {}", e)))?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(config.file_line)
        .with_line_number(config.file_line);

    let file_name = config.file_name.as_deref().unwrap_or(DEFAULT_LOG_FILE);

    match config.output {
        LogOutput::Stderr => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer.with_writer(std::io::stderr))
                .try_init()
                .map_err(|e| HostBridgeError::internal(format!("Failed to init logging: {}", e)))?;
        }
        LogOutput::File => {
            let file = open_log_file(file_name)?;

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer.with_writer(Mutex::new(file)).with_ansi(false))
                .try_init()
                .map_err(|e| HostBridgeError::internal(format!("Failed to init logging: {}", e)))?;
        }
        LogOutput::Both => {
            let file = open_log_file(file_name)?;

            let file_layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer.with_writer(std::io::stderr))
                .with(file_layer)
                .try_init()
                .map_err(|e| HostBridgeError::internal(format!("Failed to init logging: {}", e)))?;
        }
    }

    Ok(())
}

fn open_log_file(file_name: &str) -> Result<std::fs::File> {
    let log_dir = paths::log_dir();
    std::fs::create_dir_all(&log_dir).map_err(|e| HostBridgeError::FileWrite {
        path: log_dir.clone(),
        source: e,
    })?;

    let log_path = log_dir.join(file_name);
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| HostBridgeError::FileWrite {
            path: log_path,
            source: e,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== LogOutput Tests ====================

    #[test]
    fn test_log_output_parse() {
        assert_eq!("stderr".parse::<LogOutput>().unwrap(), LogOutput::Stderr);
        assert_eq!("FILE".parse::<LogOutput>().unwrap(), LogOutput::File);
        assert_eq!(" both ".parse::<LogOutput>().unwrap(), LogOutput::Both);
    }

    #[test]
    fn test_log_output_parse_invalid() {
        let err = "stdout".parse::<LogOutput>().unwrap_err();
        assert!(err.to_string().contains("stdout"));
    }

    // ==================== LogConfig Tests ====================

    #[test]
    fn test_log_config_defaults() {
        let config = LogConfig::default();
        assert_eq!(config.output, LogOutput::Stderr);
        assert_eq!(config.filter, "info");
        assert!(!config.file_line);
        assert!(config.file_name.is_none());
    }

    #[test]
    fn test_log_config_server_uses_configured_filter() {
        // Only meaningful when the override is absent from the environment
        if std::env::var(LOG_ENV_VAR).is_err() {
            let config = LogConfig::server(LogOutput::File, Some("debug"));
            assert_eq!(config.filter, "debug");
            assert_eq!(config.output, LogOutput::File);
        }
    }

    #[test]
    fn test_log_config_server_default_filter() {
        if std::env::var(LOG_ENV_VAR).is_err() {
            let config = LogConfig::server(LogOutput::Stderr, None);
            assert_eq!(config.filter, "info");
        }
    }
}
