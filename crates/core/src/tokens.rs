//! Token estimation seam.
//!
//! Exact counts need the provider's tokenizer; the pipeline only needs an
//! approximation that is stable (same input, same count) and monotonic in
//! length. Implementations live outside this crate.

use crate::message::Message;

/// Approximate token counting.
pub trait TokenEstimator {
    /// Estimate the token count of a piece of text.
    fn estimate(&self, text: &str) -> usize;

    /// Estimate the cost of one message on the wire.
    fn estimate_message(&self, message: &Message) -> usize {
        self.estimate(&message.content)
    }

    /// Estimate the cost of a message list.
    fn estimate_messages(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.estimate_message(m)).sum()
    }
}
