//! Configuration loading, validation, and management for Turnstile.
//!
//! Loads configuration from `~/.turnstile/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use turnstile_core::provider::{ModelLimits, ProviderCapabilities, ProviderCatalog};

/// The root configuration structure.
///
/// Maps directly to `~/.turnstile/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Provider used when none is given on the command line
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Model used when none is given on the command line
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Context window assumed for models without an entry in `models`
    #[serde(default = "default_context_window")]
    pub default_context_window: usize,

    /// Response budget assumed for models without an entry in `models`
    #[serde(default = "default_max_response_tokens")]
    pub default_max_response_tokens: usize,

    /// History trimming parameters
    #[serde(default)]
    pub trimming: TrimmingConfig,

    /// Provider-specific capabilities
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Per-model size limits
    #[serde(default)]
    pub models: HashMap<String, ModelConfig>,
}

fn default_provider() -> String {
    "openrouter".into()
}
fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_context_window() -> usize {
    128_000
}
fn default_max_response_tokens() -> usize {
    4096
}
fn default_true() -> bool {
    true
}

/// Parameters of the budget trimmer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrimmingConfig {
    /// Share of the context window history may occupy. The rest is held
    /// back for the response, reasoning, and estimation error.
    #[serde(default = "default_safe_ratio")]
    pub safe_ratio: f64,

    /// Fixed per-request protocol overhead added on the fast path.
    #[serde(default = "default_protocol_overhead")]
    pub protocol_overhead: usize,

    /// Multiplier applied to the history budget once trimming is needed.
    #[serde(default = "default_safety_factor")]
    pub safety_factor: f64,

    /// Floor for the history budget when the system prompt is huge.
    #[serde(default = "default_min_budget")]
    pub min_budget: usize,

    /// Number of trailing messages treated as "recent".
    #[serde(default = "default_keep_recent")]
    pub keep_recent: usize,

    /// Importance at or above which the first user message is reserved.
    #[serde(default = "default_reserved_importance")]
    pub reserved_importance: f64,
}

fn default_safe_ratio() -> f64 {
    0.58
}
fn default_protocol_overhead() -> usize {
    500
}
fn default_safety_factor() -> f64 {
    0.9
}
fn default_min_budget() -> usize {
    5000
}
fn default_keep_recent() -> usize {
    10
}
fn default_reserved_importance() -> f64 {
    10.0
}

impl Default for TrimmingConfig {
    fn default() -> Self {
        Self {
            safe_ratio: default_safe_ratio(),
            protocol_overhead: default_protocol_overhead(),
            safety_factor: default_safety_factor(),
            min_budget: default_min_budget(),
            keep_recent: default_keep_recent(),
            reserved_importance: default_reserved_importance(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Whether the provider accepts `tool` role messages
    #[serde(default = "default_true")]
    pub supports_tool_role: bool,

    /// Provider-specific settings (ignored by the pipeline)
    #[serde(flatten)]
    pub settings: HashMap<String, serde_json::Value>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            supports_tool_role: true,
            settings: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub context_window: usize,

    #[serde(default = "default_max_response_tokens")]
    pub max_response_tokens: usize,
}

impl AppConfig {
    /// Load configuration from the default path (~/.turnstile/config.toml).
    ///
    /// Environment overrides:
    /// - `TURNSTILE_PROVIDER`
    /// - `TURNSTILE_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if let Ok(provider) = std::env::var("TURNSTILE_PROVIDER") {
            config.default_provider = provider;
        }

        if let Ok(model) = std::env::var("TURNSTILE_MODEL") {
            config.default_model = model;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".turnstile")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.trimming;
        if !(t.safe_ratio > 0.0 && t.safe_ratio <= 1.0) {
            return Err(ConfigError::ValidationError(
                "trimming.safe_ratio must be in (0.0, 1.0]".into(),
            ));
        }

        if !(t.safety_factor > 0.0 && t.safety_factor <= 1.0) {
            return Err(ConfigError::ValidationError(
                "trimming.safety_factor must be in (0.0, 1.0]".into(),
            ));
        }

        if t.keep_recent == 0 {
            return Err(ConfigError::ValidationError(
                "trimming.keep_recent must be at least 1".into(),
            ));
        }

        if t.min_budget == 0 {
            return Err(ConfigError::ValidationError(
                "trimming.min_budget must be > 0".into(),
            ));
        }

        if self.default_context_window == 0 {
            return Err(ConfigError::ValidationError(
                "default_context_window must be > 0".into(),
            ));
        }

        if let Some((name, _)) = self.models.iter().find(|(_, m)| m.context_window == 0) {
            return Err(ConfigError::ValidationError(format!(
                "models.{name}.context_window must be > 0"
            )));
        }

        Ok(())
    }

    /// Size limits for a model, falling back to the configured defaults.
    pub fn model_limits(&self, model: &str) -> ModelLimits {
        match self.models.get(model) {
            Some(m) => ModelLimits {
                context_window: m.context_window,
                max_response_tokens: m.max_response_tokens,
            },
            None => ModelLimits {
                context_window: self.default_context_window,
                max_response_tokens: self.default_max_response_tokens,
            },
        }
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl ProviderCatalog for AppConfig {
    fn capabilities(&self, provider_id: &str) -> ProviderCapabilities {
        self.providers
            .get(provider_id)
            .map(|p| ProviderCapabilities {
                supports_tool_role: p.supports_tool_role,
            })
            .unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            default_model: default_model(),
            default_context_window: default_context_window(),
            default_max_response_tokens: default_max_response_tokens(),
            trimming: TrimmingConfig::default(),
            providers: HashMap::new(),
            models: HashMap::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.default_provider, "openrouter");
        assert_eq!(config.trimming.keep_recent, 10);
        assert!((config.trimming.safe_ratio - 0.58).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.trimming.min_budget, config.trimming.min_budget);
    }

    #[test]
    fn invalid_safe_ratio_rejected() {
        let config = AppConfig {
            trimming: TrimmingConfig {
                safe_ratio: 1.5,
                ..TrimmingConfig::default()
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_keep_recent_rejected() {
        let config = AppConfig {
            trimming: TrimmingConfig {
                keep_recent: 0,
                ..TrimmingConfig::default()
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        let config = result.unwrap();
        assert_eq!(config.default_provider, "openrouter");
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("openrouter"));
        assert!(toml_str.contains("keep_recent"));
    }

    #[test]
    fn providers_and_models_parsing() {
        let toml_str = r#"
default_provider = "legacy"

[providers.legacy]
supports_tool_role = false
api_url = "https://legacy.example.com"

[providers.openai]

[models."gpt-4o"]
context_window = 128000
max_response_tokens = 16384

[models.small]
context_window = 8192
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert!(!config.capabilities("legacy").supports_tool_role);
        assert!(config.capabilities("openai").supports_tool_role);
        assert!(config.capabilities("unknown").supports_tool_role);
        assert!(config.providers["legacy"].settings.contains_key("api_url"));

        let gpt = config.model_limits("gpt-4o");
        assert_eq!(gpt.max_response_tokens, 16384);
        let small = config.model_limits("small");
        assert_eq!(small.context_window, 8192);
        assert_eq!(small.max_response_tokens, 4096);
        let fallback = config.model_limits("mystery");
        assert_eq!(fallback.context_window, 128_000);
    }

    #[test]
    fn load_from_file_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[trimming]\nsafety_factor = 0.0").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn load_from_file_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_provider = [unclosed").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn zero_model_window_rejected() {
        let mut config = AppConfig::default();
        config.models.insert(
            "broken".into(),
            ModelConfig {
                context_window: 0,
                max_response_tokens: 10,
            },
        );
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("models.broken"));
    }
}
