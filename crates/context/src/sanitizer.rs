//! History sanitization — raw session records in, structurally valid
//! messages out.
//!
//! Session storage may hold anything: records without a role, stale
//! system prompts, tool results whose invocation was trimmed away on an
//! earlier turn, assistant tool calls whose results never arrived. Any of
//! these aborts a remote call, so they are removed here. Nothing in this
//! module is an error: every problem is resolved by dropping or stripping
//! the offending element and logging it at `debug`.
//!
//! # Passes
//!
//! 1. **Entry validation** — drop records with no usable role, system
//!    records, tool results without a correlation id, and empty messages.
//! 2. **Invocation pass** (forward) — an assistant message keeps its tool
//!    calls only if every call is named and every declared id is answered
//!    in the contiguous run of tool messages right after it. Otherwise all
//!    its calls are stripped.
//! 3. **Result pass** — a tool message survives only if the assistant
//!    message heading its run still declares its id, and only once per id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;
use turnstile_core::history::RawMessage;
use turnstile_core::message::{Message, MessageToolCall, Role};

/// Why an entry was removed during sanitization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    MissingRole,
    UnknownRole,
    SystemRole,
    MissingToolCallId,
    EmptyContent,
    /// Assistant message whose tool calls were stripped and had no text left.
    EmptyAfterStrip,
    OrphanedResult,
    DuplicateResult,
}

/// Counters describing what the sanitizer did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizeReport {
    /// Records received.
    pub input: usize,
    /// Messages produced.
    pub kept: usize,
    /// Assistant messages whose tool calls were stripped.
    pub stripped_invocations: usize,
    /// Dropped entries, in encounter order.
    pub drops: Vec<DropReason>,
}

impl SanitizeReport {
    pub fn dropped(&self) -> usize {
        self.drops.len()
    }

    pub fn count(&self, reason: DropReason) -> usize {
        self.drops.iter().filter(|r| **r == reason).count()
    }

    fn absorb(&mut self, other: CorrelationReport) {
        self.stripped_invocations += other.stripped_invocations;
        self.drops.extend(other.drops);
    }
}

/// Result of the correlation passes alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationReport {
    pub stripped_invocations: usize,
    pub drops: Vec<DropReason>,
}

impl CorrelationReport {
    pub fn is_clean(&self) -> bool {
        self.stripped_invocations == 0 && self.drops.is_empty()
    }
}

/// The history sanitizer. Stateless — create one and reuse it.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistorySanitizer;

impl HistorySanitizer {
    pub fn new() -> Self {
        Self
    }

    /// Turn raw history into a structurally valid message sequence.
    pub fn sanitize(&self, raw: &[RawMessage]) -> Vec<Message> {
        self.sanitize_with_report(raw).0
    }

    /// Same as [`sanitize`](Self::sanitize), also returning what was removed.
    pub fn sanitize_with_report(&self, raw: &[RawMessage]) -> (Vec<Message>, SanitizeReport) {
        let mut report = SanitizeReport {
            input: raw.len(),
            ..SanitizeReport::default()
        };

        let mut valid = Vec::with_capacity(raw.len());
        for (index, record) in raw.iter().enumerate() {
            match Self::validate_entry(index, record) {
                Ok(msg) => valid.push(msg),
                Err(reason) => {
                    debug!(index, ?reason, "Dropping history entry");
                    report.drops.push(reason);
                }
            }
        }

        let (messages, correlation) = self.repair_correlations(valid);
        report.absorb(correlation);
        report.kept = messages.len();
        (messages, report)
    }

    /// Re-establish invocation/result pairing on an already-validated
    /// sequence.
    ///
    /// After this, every tool message answers an invocation declared by
    /// the assistant message heading its run, and every invocation is
    /// answered before the next non-tool message.
    pub fn repair_correlations(&self, messages: Vec<Message>) -> (Vec<Message>, CorrelationReport) {
        let mut report = CorrelationReport::default();
        let messages = Self::invocation_pass(messages, &mut report);
        let messages = Self::result_pass(messages, &mut report);
        (messages, report)
    }

    fn validate_entry(index: usize, record: &RawMessage) -> Result<Message, DropReason> {
        let role_text = record.role.as_deref().ok_or(DropReason::MissingRole)?;
        if role_text.trim().is_empty() {
            return Err(DropReason::MissingRole);
        }
        let role: Role = role_text.parse().map_err(|_| DropReason::UnknownRole)?;

        // A fresh system prompt is built for every turn.
        if role == Role::System {
            return Err(DropReason::SystemRole);
        }

        let tool_call_id = match role {
            Role::Tool => {
                let id = record
                    .tool_call_id
                    .as_deref()
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .ok_or(DropReason::MissingToolCallId)?;
                Some(id.to_string())
            }
            _ => None,
        };

        let tool_calls = match role {
            Role::Assistant => Self::collect_tool_calls(record),
            _ => Vec::new(),
        };

        let content = record.content_text();
        let content_optional = role == Role::Tool || !tool_calls.is_empty();
        if content.trim().is_empty() && !content_optional {
            return Err(DropReason::EmptyContent);
        }

        let importance = record
            .importance
            .filter(|v| v.is_finite())
            .unwrap_or(0.0);

        Ok(Message {
            id: record
                .id
                .clone()
                .unwrap_or_else(|| format!("hist-{index}")),
            role,
            content,
            tool_calls,
            tool_call_id,
            importance,
            timestamp: record.timestamp.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            metadata: serde_json::Map::new(),
        })
    }

    /// Tool calls of an assistant record, first occurrence of each id wins.
    /// A call without an id or a name is kept as-is so the invocation pass
    /// sees it as unanswerable.
    fn collect_tool_calls(record: &RawMessage) -> Vec<MessageToolCall> {
        let mut seen = HashSet::new();
        record
            .tool_calls
            .iter()
            .map(|tc| MessageToolCall {
                id: tc.id.as_deref().map(str::trim).unwrap_or_default().to_string(),
                name: tc.name.clone(),
                arguments: tc.arguments_value(),
            })
            .filter(|tc| tc.id.is_empty() || seen.insert(tc.id.clone()))
            .collect()
    }

    fn invocation_pass(messages: Vec<Message>, report: &mut CorrelationReport) -> Vec<Message> {
        let answered_flags: Vec<bool> = messages
            .iter()
            .enumerate()
            .map(|(i, msg)| {
                if !msg.has_tool_calls() {
                    return true;
                }
                let answered: HashSet<&str> = messages[i + 1..]
                    .iter()
                    .take_while(|m| m.role == Role::Tool)
                    .filter_map(|m| m.tool_call_id.as_deref())
                    .collect();
                msg.tool_calls
                    .iter()
                    .all(|tc| {
                        !tc.id.is_empty()
                            && !tc.name.trim().is_empty()
                            && answered.contains(tc.id.as_str())
                    })
            })
            .collect();

        let mut out = Vec::with_capacity(messages.len());
        for (mut msg, complete) in messages.into_iter().zip(answered_flags) {
            if complete {
                out.push(msg);
                continue;
            }

            debug!(
                message_id = %msg.id,
                calls = msg.tool_calls.len(),
                "Stripping unanswered tool calls"
            );
            msg.tool_calls.clear();
            report.stripped_invocations += 1;

            if msg.has_content() {
                out.push(msg);
            } else {
                debug!(message_id = %msg.id, "Dropping assistant message left empty");
                report.drops.push(DropReason::EmptyAfterStrip);
            }
        }
        out
    }

    fn result_pass(messages: Vec<Message>, report: &mut CorrelationReport) -> Vec<Message> {
        // Ids declared by the assistant heading the current tool run, and
        // the ones already answered within it.
        let mut declared: HashSet<String> = HashSet::new();
        let mut answered: HashSet<String> = HashSet::new();

        let mut out = Vec::with_capacity(messages.len());
        for msg in messages {
            if msg.role != Role::Tool {
                declared.clear();
                answered.clear();
                if msg.has_tool_calls() {
                    declared.extend(msg.tool_calls.iter().map(|tc| tc.id.clone()));
                }
                out.push(msg);
                continue;
            }

            let id = msg.tool_call_id.clone().unwrap_or_default();
            if !declared.contains(&id) {
                debug!(tool_call_id = %id, "Dropping orphaned tool result");
                report.drops.push(DropReason::OrphanedResult);
            } else if !answered.insert(id.clone()) {
                debug!(tool_call_id = %id, "Dropping duplicate tool result");
                report.drops.push(DropReason::DuplicateResult);
            } else {
                out.push(msg);
            }
        }
        out
    }
}
