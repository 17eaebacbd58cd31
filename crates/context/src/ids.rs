//! Synthesized tool-call identifiers.
//!
//! Some models emit tool calls without an id, or reuse one. Each session
//! owns a [`ToolCallIdGenerator`]; ids are derived from a per-generator
//! random salt, a monotonically increasing counter and the current time,
//! hashed with SHA-256 so they never collide across sessions.

use chrono::Utc;
use sha2::{Digest, Sha256};

/// Prefix of every synthesized id.
pub const TOOL_CALL_ID_PREFIX: &str = "call_";

/// Hex characters kept from the digest.
const ID_HEX_LEN: usize = 24;

/// Owned id generator. Not shared between sessions.
#[derive(Debug, Clone)]
pub struct ToolCallIdGenerator {
    salt: [u8; 16],
    counter: u64,
}

impl ToolCallIdGenerator {
    pub fn new() -> Self {
        Self {
            salt: *uuid::Uuid::new_v4().as_bytes(),
            counter: 0,
        }
    }

    /// Number of ids handed out so far.
    pub fn issued(&self) -> u64 {
        self.counter
    }

    /// Produce a fresh id: `call_` followed by 24 lowercase hex chars.
    pub fn next_id(&mut self) -> String {
        self.counter += 1;
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();

        let mut hasher = Sha256::new();
        hasher.update(self.salt);
        hasher.update(nanos.to_le_bytes());
        hasher.update(self.counter.to_le_bytes());
        let digest = hex::encode(hasher.finalize());

        format!("{TOOL_CALL_ID_PREFIX}{}", &digest[..ID_HEX_LEN])
    }
}

impl Default for ToolCallIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `id` has the shape of a synthesized id.
pub fn is_synthetic(id: &str) -> bool {
    id.strip_prefix(TOOL_CALL_ID_PREFIX).is_some_and(|rest| {
        rest.len() == ID_HEX_LEN && rest.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    })
}
