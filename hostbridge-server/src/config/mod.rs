//! Configuration management for the hostbridge server
//!
//! TOML file at `$XDG_CONFIG_HOME/hostbridge/config.toml` (or `--config`),
//! with CLI/environment overrides applied on top by `main`.

mod defaults;
mod loader;
mod schema;

pub use defaults::DEFAULT_CONFIG_TOML;
pub use loader::ConfigLoader;
pub use schema::*;

/// Make sure a bearer token is configured, generating one if needed
///
/// Returns the generated token so the caller can show it to the user once.
pub fn ensure_token(config: &mut AppConfig) -> Option<String> {
    if config.bridge.token.is_some() {
        return None;
    }
    let generated = uuid::Uuid::new_v4().to_string();
    config.bridge.token = Some(generated.clone());
    Some(generated)
}
