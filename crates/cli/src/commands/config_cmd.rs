//! `turnstile config` — Configuration management commands.

use std::path::{Path, PathBuf};
use turnstile_config::AppConfig;
use turnstile_context::BudgetTrimmer;
use turnstile_core::Error;

pub fn validate(config_path: Option<&Path>) -> turnstile_core::Result<()> {
    println!("🔍 Validating configuration...");

    match super::load_config(config_path) {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let mut warnings = Vec::new();

            let reserve = response_reserve(&config);
            if config.default_max_response_tokens > reserve {
                warnings.push(format!(
                    "default_max_response_tokens ({}) exceeds the reserve above the safe threshold ({reserve})",
                    config.default_max_response_tokens
                ));
            }

            for (name, model) in &config.models {
                if model.max_response_tokens >= model.context_window {
                    warnings.push(format!(
                        "models.{name}: max_response_tokens fills the whole context window"
                    ));
                }
            }

            if !config.providers.contains_key(&config.default_provider) {
                warnings.push(format!(
                    "No [providers.{}] section; assuming tool-role support",
                    config.default_provider
                ));
            }

            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            let limits = config.model_limits(&config.default_model);
            println!();
            println!("   Provider:  {}", config.default_provider);
            println!("   Model:     {}", config.default_model);
            println!("   Window:    {}", limits.context_window);
            println!("   Response:  {}", limits.max_response_tokens);
            println!("   Keep:      {} recent", config.trimming.keep_recent);
        }
        Err(e) => {
            println!("   ❌ {e}");
            return Err(e);
        }
    }

    Ok(())
}

pub fn show(config_path: Option<&Path>) -> turnstile_core::Result<()> {
    let config = super::load_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config).map_err(|e| Error::Config {
        message: format!("Failed to render config: {e}"),
    })?;
    println!("{toml_str}");
    Ok(())
}

pub fn path(config_path: Option<&Path>) -> turnstile_core::Result<()> {
    println!("{}", resolve_path(config_path).display());
    Ok(())
}

/// Tokens left above the safe threshold of the default context window.
fn response_reserve(config: &AppConfig) -> usize {
    let window = config.default_context_window;
    let threshold = BudgetTrimmer::new(config.trimming.clone()).safe_threshold(window);
    window.saturating_sub(threshold)
}

fn resolve_path(config_path: Option<&Path>) -> PathBuf {
    config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}
