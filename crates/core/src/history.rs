//! Raw session history and the accessor the pipeline reads it through.
//!
//! Session storage keeps loosely-typed records: roles are free text,
//! content may be a string, a list of text parts or missing entirely, and
//! tool-call arguments may be an object or a JSON-encoded string. Tool
//! calls are read in both the flat `{id, name, arguments}` shape and the
//! nested `{id, type, function: {name, arguments}}` shape. Nothing here
//! validates; that is the sanitizer's job.

use crate::error::HistoryError;
use crate::message::{Conversation, Message};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// One history record exactly as stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,

    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub tool_calls: Vec<RawToolCall>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A tool call as stored in history. Always serialized flat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "ToolCallRecord")]
pub struct RawToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub name: String,

    pub arguments: serde_json::Value,
}

/// Either stored tool-call shape. Top-level fields win when present.
#[derive(Deserialize)]
struct ToolCallRecord {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<serde_json::Value>,
    #[serde(default)]
    function: Option<FunctionRecord>,
}

#[derive(Deserialize)]
struct FunctionRecord {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<serde_json::Value>,
}

impl From<ToolCallRecord> for RawToolCall {
    fn from(record: ToolCallRecord) -> Self {
        let (fn_name, fn_arguments) = match record.function {
            Some(f) => (f.name, f.arguments),
            None => (None, None),
        };
        Self {
            id: record.id,
            name: record
                .name
                .filter(|n| !n.trim().is_empty())
                .or(fn_name)
                .unwrap_or_default(),
            arguments: record
                .arguments
                .filter(|a| !a.is_null())
                .or(fn_arguments)
                .unwrap_or_default(),
        }
    }
}

/// `"tool_calls": null` reads as no tool calls.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<RawToolCall>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<RawToolCall>>::deserialize(deserializer)?.unwrap_or_default())
}

impl RawMessage {
    /// Shorthand for a record with a role and plain string content.
    pub fn new(role: &str, content: &str) -> Self {
        Self {
            role: Some(role.to_string()),
            content: Some(serde_json::Value::String(content.to_string())),
            ..Self::default()
        }
    }

    /// Flatten the stored content into plain text.
    ///
    /// Strings pass through, arrays of `{"type": "text", "text": ..}` parts
    /// are joined with newlines, null becomes empty, anything else is
    /// rendered as compact JSON.
    pub fn content_text(&self) -> String {
        match &self.content {
            None | Some(serde_json::Value::Null) => String::new(),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Array(parts)) => parts
                .iter()
                .filter_map(|part| match part {
                    serde_json::Value::String(s) => Some(s.as_str()),
                    serde_json::Value::Object(obj) => obj.get("text").and_then(|t| t.as_str()),
                    _ => None,
                })
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
            Some(other) => other.to_string(),
        }
    }
}

impl RawToolCall {
    /// Arguments as a JSON value; JSON-encoded strings are decoded when
    /// they parse, otherwise kept as the original string.
    pub fn arguments_value(&self) -> serde_json::Value {
        match &self.arguments {
            serde_json::Value::String(s) => {
                serde_json::from_str(s).unwrap_or_else(|_| self.arguments.clone())
            }
            other => other.clone(),
        }
    }
}

impl From<&Message> for RawMessage {
    fn from(msg: &Message) -> Self {
        Self {
            id: Some(msg.id.clone()),
            role: Some(msg.role.as_str().to_string()),
            content: Some(serde_json::Value::String(msg.content.clone())),
            tool_calls: msg
                .tool_calls
                .iter()
                .map(|tc| RawToolCall {
                    id: Some(tc.id.clone()),
                    name: tc.name.clone(),
                    arguments: tc.arguments.clone(),
                })
                .collect(),
            tool_call_id: msg.tool_call_id.clone(),
            importance: (msg.importance != 0.0).then_some(msg.importance),
            timestamp: Some(msg.timestamp),
        }
    }
}

/// The single "get history" capability the pipeline depends on.
///
/// Whatever the session store looks like underneath, it hands out an
/// ordered snapshot of raw records. Callers must not mutate the store
/// while a snapshot is being processed.
pub trait HistorySource {
    /// Human-readable name used in logs and errors.
    fn source_name(&self) -> &str {
        "history"
    }

    /// Read a fresh snapshot of the history.
    fn history(&self) -> Result<Vec<RawMessage>, HistoryError>;
}

impl HistorySource for Conversation {
    fn source_name(&self) -> &str {
        &self.id.0
    }

    fn history(&self) -> Result<Vec<RawMessage>, HistoryError> {
        Ok(self.messages.iter().map(RawMessage::from).collect())
    }
}

impl HistorySource for [RawMessage] {
    fn history(&self) -> Result<Vec<RawMessage>, HistoryError> {
        Ok(self.to_vec())
    }
}

impl HistorySource for Vec<RawMessage> {
    fn history(&self) -> Result<Vec<RawMessage>, HistoryError> {
        Ok(self.clone())
    }
}
