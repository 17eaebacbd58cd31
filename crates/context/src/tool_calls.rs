//! Tool-call normalization for the execution loop.
//!
//! When the model emits a tool call, its id may be missing and its
//! arguments may be malformed. The normalizer fills in ids from the
//! session's [`ToolCallIdGenerator`], repairs arguments where it can and
//! reports the rest as [`ToolCallError`]s so the caller can send the
//! failure back to the model instead of dropping the call.

use crate::ids::ToolCallIdGenerator;
use crate::json_repair::JsonRepairer;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};
use turnstile_core::error::ToolCallError;
use turnstile_core::message::{Message, MessageToolCall};

/// Name used for failed calls that arrived without one.
const UNKNOWN_TOOL: &str = "unknown";

/// A tool call as the model emitted it, arguments still as text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmittedToolCall {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

impl EmittedToolCall {
    pub fn new(id: Option<&str>, name: &str, arguments: &str) -> Self {
        Self {
            id: id.map(str::to_string),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }
}

/// Per-session normalizer. Owns the session's id generator.
#[derive(Debug, Default)]
pub struct ToolCallNormalizer {
    ids: ToolCallIdGenerator,
    repairer: JsonRepairer,
}

impl ToolCallNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing generator, e.g. one already tied to the session.
    pub fn with_generator(ids: ToolCallIdGenerator) -> Self {
        Self {
            ids,
            repairer: JsonRepairer::new(),
        }
    }

    pub fn ids(&mut self) -> &mut ToolCallIdGenerator {
        &mut self.ids
    }

    /// Normalize one emitted call.
    pub fn normalize(&mut self, call: EmittedToolCall) -> Result<MessageToolCall, ToolCallError> {
        let id = match call.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => self.ids.next_id(),
        };
        self.finish(id, call)
    }

    /// Normalize a batch from one assistant turn. Ids repeated within the
    /// batch are replaced so every result can be correlated.
    pub fn normalize_all(
        &mut self,
        calls: Vec<EmittedToolCall>,
    ) -> Vec<Result<MessageToolCall, ToolCallError>> {
        let mut seen: HashSet<String> = HashSet::new();
        calls
            .into_iter()
            .map(|call| {
                let id = match call.id.as_deref().map(str::trim) {
                    Some(id) if !id.is_empty() && !seen.contains(id) => id.to_string(),
                    Some(id) if !id.is_empty() => {
                        let fresh = self.ids.next_id();
                        debug!(duplicate = id, replacement = %fresh, "Replaced duplicate tool call id");
                        fresh
                    }
                    _ => self.ids.next_id(),
                };
                seen.insert(id.clone());
                self.finish(id, call)
            })
            .collect()
    }

    fn finish(&self, id: String, call: EmittedToolCall) -> Result<MessageToolCall, ToolCallError> {
        let name = call.name.trim();
        if name.is_empty() {
            warn!(call_id = %id, "Tool call has no name");
            return Err(ToolCallError::MissingName { call_id: id });
        }

        let raw = call.arguments.trim();
        if raw.is_empty() {
            return Ok(MessageToolCall::new(id, name, serde_json::json!({})));
        }

        if let Ok(arguments) = serde_json::from_str(raw) {
            return Ok(MessageToolCall::new(id, name, arguments));
        }

        let repaired = self
            .repairer
            .repair(raw)
            .and_then(|text| serde_json::from_str::<serde_json::Value>(&text).ok());
        match repaired {
            Some(arguments) => {
                debug!(call_id = %id, tool = name, "Repaired malformed tool arguments");
                Ok(MessageToolCall::new(id, name, arguments))
            }
            None => {
                warn!(call_id = %id, tool = name, "Tool arguments could not be repaired");
                Err(ToolCallError::UnrepairableArguments {
                    call_id: id,
                    name: name.to_string(),
                    raw: call.arguments,
                })
            }
        }
    }
}

/// Build the call/result pair that reports a failed call back to the
/// model. The call keeps the raw arguments as a string so the model can
/// see what it sent.
pub fn failure_exchange(error: &ToolCallError) -> (MessageToolCall, Message) {
    let (name, arguments) = match error {
        ToolCallError::MissingName { .. } => (UNKNOWN_TOOL, serde_json::json!({})),
        ToolCallError::UnrepairableArguments { name, raw, .. } => {
            (name.as_str(), serde_json::Value::String(raw.clone()))
        }
    };
    let call = MessageToolCall::new(error.call_id(), name, arguments);
    let result = Message::tool_result(error.call_id(), format!("Error: {error}"));
    (call, result)
}
