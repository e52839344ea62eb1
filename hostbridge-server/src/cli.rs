//! Command-line argument parsing for the hostbridge server
//!
//! Uses clap for argument parsing with derive macros.

use clap::Parser;
use std::path::PathBuf;

use crate::config::AppConfig;

/// hostbridge - MCP stdio server that forwards tool calls to host executors
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file
    ///
    /// Defaults to `$XDG_CONFIG_HOME/hostbridge/config.toml`; a missing
    /// default file means built-in defaults.
    #[arg(long, short = 'c', env = "HOSTBRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Bridge port (overrides `bridge.port`)
    #[arg(long, short = 'p', env = "HOSTBRIDGE_PORT")]
    pub port: Option<u16>,

    /// Bearer token executors must present (overrides `bridge.token`)
    #[arg(long, env = "HOSTBRIDGE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Print the default configuration file and exit
    #[arg(long, default_value_t = false)]
    pub print_default_config: bool,
}

impl Args {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Apply CLI/environment overrides on top of the file configuration
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(port) = self.port {
            config.bridge.port = port;
        }
        if let Some(token) = &self.token {
            config.bridge.token = Some(token.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = Args::parse_from(["hostbridge-server"]);
        assert!(!args.print_default_config);
        assert!(args.config.is_none());
    }

    #[test]
    fn test_overrides_applied() {
        let args = Args::parse_from(["hostbridge-server", "--port", "4444", "--token", "abc"]);
        let mut config = AppConfig::default();
        args.apply_overrides(&mut config);

        assert_eq!(config.bridge.port, 4444);
        assert_eq!(config.bridge.token.as_deref(), Some("abc"));
    }

    #[test]
    fn test_no_overrides_keep_config() {
        let args = Args {
            config: None,
            port: None,
            token: None,
            print_default_config: false,
        };
        let mut config = AppConfig::default();
        config.bridge.token = Some("from-file".into());
        args.apply_overrides(&mut config);

        assert_eq!(config.bridge.port, 3333);
        assert_eq!(config.bridge.token.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_config_path() {
        let args = Args::parse_from(["hostbridge-server", "-c", "/tmp/hb.toml"]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/hb.toml")));
    }
}
