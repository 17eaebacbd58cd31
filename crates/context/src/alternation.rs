//! Role alternation — shape a trimmed sequence for a specific provider.
//!
//! Providers reject consecutive messages with the same role, and some have
//! no `tool` role at all. For those, tool results are folded into user
//! messages and assistant tool calls are stripped, since nothing could be
//! correlated with them anymore.
//!
//! Merging is an accumulate-and-flush scan: the in-progress message is
//! flushed whenever the role changes, plus once at the end. Tool results
//! are never merged with each other; each keeps its own `tool_call_id`.

use tracing::debug;
use turnstile_core::message::{Message, Role};
use turnstile_core::provider::{ProviderCapabilities, ProviderCatalog};

/// Separator placed between merged contents.
pub const MERGE_SEPARATOR: &str = "\n\n";

/// Content of a tool result folded into a user message.
pub fn tool_result_as_user_text(tool_call_id: &str, content: &str) -> String {
    format!("Tool Result (ID: {tool_call_id}):\n{content}")
}

/// The alternation enforcer. Stateless — create one and reuse it.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlternationEnforcer;

impl AlternationEnforcer {
    pub fn new() -> Self {
        Self
    }

    /// Enforce the rules of `provider_id`, looked up in `catalog`.
    pub fn enforce_for(
        &self,
        messages: &[Message],
        provider_id: &str,
        catalog: &dyn ProviderCatalog,
    ) -> Vec<Message> {
        self.enforce(messages, catalog.capabilities(provider_id))
    }

    /// Enforce role rules for a provider with the given capabilities.
    pub fn enforce(&self, messages: &[Message], capabilities: ProviderCapabilities) -> Vec<Message> {
        let shaped: Vec<Message> = if capabilities.supports_tool_role {
            messages.to_vec()
        } else {
            Self::fold_tool_results(messages)
        };

        let mut out: Vec<Message> = Vec::with_capacity(shaped.len());
        let mut pending: Option<Message> = None;

        for msg in shaped {
            match pending.as_mut() {
                Some(acc) if acc.role == msg.role && msg.role != Role::Tool => {
                    Self::merge_into(acc, msg);
                }
                _ => {
                    if let Some(done) = pending.take() {
                        out.push(done);
                    }
                    pending = Some(msg);
                }
            }
        }
        if let Some(done) = pending {
            out.push(done);
        }

        if out.len() != messages.len() {
            debug!(
                before = messages.len(),
                after = out.len(),
                supports_tool_role = capabilities.supports_tool_role,
                "Merged consecutive same-role messages"
            );
        }
        out
    }

    /// Rewrite tool results as user messages and strip assistant tool calls.
    /// Assistant messages that only carried tool calls vanish.
    fn fold_tool_results(messages: &[Message]) -> Vec<Message> {
        messages
            .iter()
            .filter_map(|msg| {
                let mut msg = msg.clone();
                match msg.role {
                    Role::Tool => {
                        let id = msg.tool_call_id.take().unwrap_or_default();
                        msg.content = tool_result_as_user_text(&id, &msg.content);
                        msg.role = Role::User;
                    }
                    Role::Assistant => {
                        msg.tool_calls.clear();
                        if !msg.has_content() {
                            return None;
                        }
                    }
                    _ => {}
                }
                Some(msg)
            })
            .collect()
    }

    /// Fold `next` into `acc`. The first message's id, timestamp and
    /// metadata win; importance is the maximum of both.
    fn merge_into(acc: &mut Message, next: Message) {
        if next.has_content() {
            if acc.has_content() {
                acc.content.push_str(MERGE_SEPARATOR);
                acc.content.push_str(&next.content);
            } else {
                acc.content = next.content;
            }
        }
        acc.tool_calls.extend(next.tool_calls);
        acc.importance = acc.importance.max(next.importance);
    }
}
