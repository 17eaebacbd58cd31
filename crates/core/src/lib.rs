//! # Turnstile Core
//!
//! Domain types, traits, and error definitions for the Turnstile
//! conversation-context pipeline. This crate has **no pipeline logic** — it
//! defines the domain model that the other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator the pipeline consumes is a trait here:
//! - [`HistorySource`] hands out a raw history snapshot
//! - [`TokenEstimator`] approximates token counts
//! - [`ProviderCatalog`] answers what a provider's wire format supports
//!
//! Implementations live in their respective crates, so the pipeline can be
//! tested with plain in-memory values.

pub mod error;
pub mod history;
pub mod message;
pub mod provider;
pub mod tokens;

// Re-export key types at crate root for ergonomics
pub use error::{Error, HistoryError, Result, ToolCallError};
pub use history::{HistorySource, RawMessage, RawToolCall};
pub use message::{Conversation, ConversationId, Message, MessageToolCall, Role};
pub use provider::{ModelLimits, ProviderCapabilities, ProviderCatalog};
pub use tokens::TokenEstimator;
