//! Conversation-context preparation for Turnstile.
//!
//! Takes raw session history and produces a message sequence a provider
//! will accept:
//!
//! 1. **Sanitize** — drop structurally broken entries, re-pair tool calls
//!    with their results
//! 2. **Trim** — evict by importance until the history fits the model's
//!    safe threshold
//! 3. **Enforce** — merge same-role neighbours and fold tool results for
//!    providers without a tool role
//!
//! The tool-execution loop additionally uses [`ToolCallNormalizer`] to fix
//! up calls as the model emits them.

pub mod alternation;
pub mod ids;
pub mod json_repair;
pub mod pipeline;
pub mod sanitizer;
pub mod token;
pub mod tool_calls;
pub mod trimmer;

pub use alternation::AlternationEnforcer;
pub use ids::ToolCallIdGenerator;
pub use json_repair::{JsonRepairer, repair_json};
pub use pipeline::{ContextPipeline, PipelineReport, PreparedContext, TurnRequest};
pub use sanitizer::{CorrelationReport, DropReason, HistorySanitizer, SanitizeReport};
pub use token::HeuristicEstimator;
pub use tool_calls::{EmittedToolCall, ToolCallNormalizer, failure_exchange};
pub use trimmer::{BudgetTrimmer, TrimDecision, TrimOutcome, TrimReport};
