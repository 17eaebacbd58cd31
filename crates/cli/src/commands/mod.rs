pub mod config_cmd;
pub mod ids;
pub mod prepare;
pub mod repair;

use std::path::Path;
use turnstile_config::AppConfig;
use turnstile_core::Error;

/// Load the config from `path` if given, otherwise from the default location.
pub fn load_config(path: Option<&Path>) -> turnstile_core::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    config.map_err(|e| Error::Config {
        message: format!("Failed to load config: {e}"),
    })
}
