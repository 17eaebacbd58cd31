//! Provider capability descriptions.
//!
//! The pipeline never talks to a provider. It only needs to know what the
//! provider's wire format tolerates and how large the model's window is;
//! both come from outside (configuration or a model-capability lookup).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What a provider's chat format supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    /// Whether the provider accepts `role: "tool"` messages correlated to
    /// assistant tool calls. Providers without it get tool results folded
    /// into user messages.
    pub supports_tool_role: bool,
}

impl Default for ProviderCapabilities {
    fn default() -> Self {
        Self {
            supports_tool_role: true,
        }
    }
}

/// Size limits of the target model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelLimits {
    /// Total context window in tokens.
    pub context_window: usize,
    /// Maximum tokens the model may generate in one response.
    pub max_response_tokens: usize,
}

impl Default for ModelLimits {
    fn default() -> Self {
        Self {
            context_window: 128_000,
            max_response_tokens: 4096,
        }
    }
}

/// Resolves a provider id to its capabilities.
pub trait ProviderCatalog {
    fn capabilities(&self, provider_id: &str) -> ProviderCapabilities;
}

/// A fixed catalog; unknown providers get the default capabilities.
impl ProviderCatalog for HashMap<String, ProviderCapabilities> {
    fn capabilities(&self, provider_id: &str) -> ProviderCapabilities {
        self.get(provider_id).copied().unwrap_or_default()
    }
}

/// Every provider gets the same capabilities.
impl ProviderCatalog for ProviderCapabilities {
    fn capabilities(&self, _provider_id: &str) -> ProviderCapabilities {
        *self
    }
}
