//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token.
//! This approximation is accurate within ~10% for BPE tokenizers
//! (GPT-4, Claude) on English text, which the trimmer's safety factor
//! absorbs.

use turnstile_core::message::Message;
use turnstile_core::tokens::TokenEstimator;

/// Per-message overhead for role name, delimiters and formatting markers
/// in the API wire format.
pub const MESSAGE_OVERHEAD: usize = 4;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}

/// Estimate tokens for a single message including per-message overhead.
///
/// Tool calls count their id, name and serialized arguments; tool results
/// count the correlation id.
pub fn estimate_message_tokens(message: &Message) -> usize {
    let mut tokens = MESSAGE_OVERHEAD + estimate_tokens(&message.content);
    for call in &message.tool_calls {
        tokens += estimate_tokens(&call.id);
        tokens += estimate_tokens(&call.name);
        tokens += estimate_tokens(&call.arguments.to_string());
    }
    if let Some(id) = &message.tool_call_id {
        tokens += estimate_tokens(id);
    }
    tokens
}

/// Estimate tokens for a slice of messages.
pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

/// The default [`TokenEstimator`]: the 4-chars-per-token heuristic.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicEstimator;

impl TokenEstimator for HeuristicEstimator {
    fn estimate(&self, text: &str) -> usize {
        estimate_tokens(text)
    }

    fn estimate_message(&self, message: &Message) -> usize {
        estimate_message_tokens(message)
    }
}
