//! Error types for the Turnstile domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant. Structural problems in
//! the history itself are not errors: the sanitizer drops them and moves on.

use thiserror::Error;

/// The top-level error type for all Turnstile operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- History source errors ---
    #[error("History error: {0}")]
    History(#[from] HistoryError),

    // --- Tool call normalization errors ---
    #[error("Tool call error: {0}")]
    ToolCall(#[from] ToolCallError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Local files ---
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures while reading a history snapshot from session storage.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Failed to read history from {source_name}: {reason}")]
    ReadFailed { source_name: String, reason: String },

    #[error("Malformed history record {index}: {reason}")]
    MalformedRecord { index: usize, reason: String },
}

/// Failures surfaced by the tool-call normalizer. These go back to the
/// model as a failed tool call; they are never silently swallowed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolCallError {
    #[error("Tool call {call_id} has no tool name")]
    MissingName { call_id: String },

    #[error("Unrepairable arguments for {name} (call {call_id}): {raw}")]
    UnrepairableArguments {
        call_id: String,
        name: String,
        raw: String,
    },
}

impl ToolCallError {
    /// The id of the call that failed, for correlating the failure result.
    pub fn call_id(&self) -> &str {
        match self {
            Self::MissingName { call_id } => call_id,
            Self::UnrepairableArguments { call_id, .. } => call_id,
        }
    }
}
