//! Configuration loader

use std::net::IpAddr;
use std::path::Path;

use hostbridge_utils::{config_file, HostBridgeError, Result};

use super::AppConfig;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from an explicit path, or the default location
    ///
    /// An explicit path must exist. A missing default file means defaults.
    pub fn load(explicit: Option<&Path>) -> Result<AppConfig> {
        match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(HostBridgeError::ConfigNotFound(path.to_path_buf()));
                }
                Self::load_from_path(path)
            }
            None => {
                let path = config_file();
                if path.exists() {
                    Self::load_from_path(&path)
                } else {
                    Ok(AppConfig::default())
                }
            }
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<AppConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| HostBridgeError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::parse(&content, path)
    }

    /// Parse configuration from string
    pub fn parse(content: &str, path: &Path) -> Result<AppConfig> {
        toml::from_str(content).map_err(|e| HostBridgeError::ConfigInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Validate configuration
    pub fn validate(config: &AppConfig) -> Result<()> {
        let host: IpAddr = config.bridge.host.parse().map_err(|_| {
            HostBridgeError::config(format!(
                "bridge.host '{}' is not an IP address",
                config.bridge.host
            ))
        })?;
        if !host.is_loopback() {
            return Err(HostBridgeError::config(format!(
                "bridge.host must be a loopback address, got {}",
                host
            )));
        }

        if let Some(token) = &config.bridge.token {
            if token.trim().is_empty() {
                return Err(HostBridgeError::config("bridge.token must not be empty"));
            }
        }

        if config.bridge.long_poll_secs == 0 {
            return Err(HostBridgeError::config("bridge.long_poll_secs must be at least 1"));
        }

        if config.bridge.pull_recheck_ms == 0 {
            return Err(HostBridgeError::config("bridge.pull_recheck_ms must be at least 1"));
        }

        if config.bridge.max_body_bytes < 1024 {
            return Err(HostBridgeError::config("bridge.max_body_bytes must be at least 1024"));
        }

        if config.broker.sweep_interval_secs == 0 {
            return Err(HostBridgeError::config("broker.sweep_interval_secs must be at least 1"));
        }

        if config.broker.default_call_timeout_secs == 0 {
            return Err(HostBridgeError::config(
                "broker.default_call_timeout_secs must be at least 1",
            ));
        }

        // A client blocked in a long-poll must not look idle to the sweeper
        if config.broker.inactivity_timeout_secs <= config.bridge.long_poll_secs {
            return Err(HostBridgeError::config(
                "broker.inactivity_timeout_secs must exceed bridge.long_poll_secs",
            ));
        }

        if config.routing.secondary_marker.trim().is_empty() {
            return Err(HostBridgeError::config("routing.secondary_marker must not be empty"));
        }

        for (name, route) in &config.routing.tools {
            if route.timeout_secs == Some(0) {
                return Err(HostBridgeError::config(format!(
                    "routing.tools.{}.timeout_secs must be at least 1",
                    name
                )));
            }
        }

        config.logging.output.parse::<hostbridge_utils::LogOutput>()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_from_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        std::fs::write(
            &path,
            r#"
            [bridge]
            port = 4040
            token = "s3cret"
            "#,
        )
        .unwrap();

        let config = ConfigLoader::load(Some(&path)).unwrap();
        assert_eq!(config.bridge.port, 4040);
        assert_eq!(config.bridge.token.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_load_explicit_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nope.toml");

        let result = ConfigLoader::load(Some(&path));
        assert!(matches!(result, Err(HostBridgeError::ConfigNotFound(_))));
    }

    #[test]
    fn test_parse_invalid_toml() {
        let result = ConfigLoader::parse("invalid { toml", Path::new("test.toml"));
        assert!(matches!(result, Err(HostBridgeError::ConfigInvalid { .. })));
    }

    #[test]
    fn test_validate_defaults() {
        assert!(ConfigLoader::validate(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_rejects_public_host() {
        let mut config = AppConfig::default();
        config.bridge.host = "0.0.0.0".into();
        assert!(ConfigLoader::validate(&config).is_err());
    }

    #[test]
    fn test_validate_accepts_ipv6_loopback() {
        let mut config = AppConfig::default();
        config.bridge.host = "::1".into();
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_validate_rejects_hostname() {
        let mut config = AppConfig::default();
        config.bridge.host = "localhost".into();
        assert!(ConfigLoader::validate(&config).is_err());
    }

    #[test]
    fn test_validate_rejects_inactivity_shorter_than_long_poll() {
        let mut config = AppConfig::default();
        config.broker.inactivity_timeout_secs = 20;
        config.bridge.long_poll_secs = 25;
        assert!(ConfigLoader::validate(&config).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_tool_timeout() {
        let mut config = AppConfig::default();
        config
            .routing
            .tools
            .get_mut("run_script")
            .unwrap()
            .timeout_secs = Some(0);
        assert!(ConfigLoader::validate(&config).is_err());
    }

    #[test]
    fn test_validate_rejects_blank_token() {
        let mut config = AppConfig::default();
        config.bridge.token = Some("   ".into());
        assert!(ConfigLoader::validate(&config).is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_log_output() {
        let mut config = AppConfig::default();
        config.logging.output = "stdout".into();
        assert!(ConfigLoader::validate(&config).is_err());
    }
}
