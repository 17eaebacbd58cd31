//! Context preparation pipeline — one outbound turn, start to finish.
//!
//! ```text
//! HistorySource → sanitize → trim → repair correlations → enforce roles
//! ```
//!
//! Correlations are repaired a second time after trimming because eviction
//! can separate an invocation from its results, and reserving the first
//! user message can move it in front of a tool run.
//!
//! # Determinism
//!
//! Preparation is deterministic: the same snapshot, request and catalog
//! always produce the same messages. Reading the snapshot is the only
//! fallible step.

use crate::alternation::AlternationEnforcer;
use crate::sanitizer::{CorrelationReport, HistorySanitizer, SanitizeReport};
use crate::token::HeuristicEstimator;
use crate::trimmer::{BudgetTrimmer, TrimReport};
use serde::{Deserialize, Serialize};
use tracing::info;
use turnstile_config::TrimmingConfig;
use turnstile_core::error::HistoryError;
use turnstile_core::history::{HistorySource, RawMessage};
use turnstile_core::message::Message;
use turnstile_core::provider::{ModelLimits, ProviderCatalog};
use turnstile_core::tokens::TokenEstimator;

// ── Types ─────────────────────────────────────────────────────────────────

/// Per-turn inputs besides the history itself.
#[derive(Debug, Clone, Copy)]
pub struct TurnRequest<'a> {
    /// System prompt sent with the turn; only its size matters here.
    pub system_prompt: &'a str,
    /// Provider the messages will be sent to.
    pub provider_id: &'a str,
    /// Limits of the target model.
    pub limits: ModelLimits,
}

/// Messages ready for the transport layer.
#[derive(Debug, Clone)]
pub struct PreparedContext {
    pub messages: Vec<Message>,
    pub report: PipelineReport,
}

/// What each stage did, for callers to log or display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub sanitize: SanitizeReport,
    pub trim: TrimReport,
    /// Second correlation repair, after trimming.
    pub post_trim: CorrelationReport,
    pub provider_id: String,
    pub supports_tool_role: bool,
    pub final_messages: usize,
    /// Estimated tokens of the final messages, system prompt excluded.
    pub final_tokens: usize,
}

// ── Pipeline ──────────────────────────────────────────────────────────────

/// Composes the stages. Holds no per-session state; reuse it freely.
#[derive(Debug, Clone)]
pub struct ContextPipeline<E = HeuristicEstimator> {
    sanitizer: HistorySanitizer,
    trimmer: BudgetTrimmer<E>,
    enforcer: AlternationEnforcer,
}

impl ContextPipeline<HeuristicEstimator> {
    pub fn new(config: TrimmingConfig) -> Self {
        Self::with_estimator(config, HeuristicEstimator)
    }
}

impl Default for ContextPipeline<HeuristicEstimator> {
    fn default() -> Self {
        Self::new(TrimmingConfig::default())
    }
}

impl<E: TokenEstimator> ContextPipeline<E> {
    pub fn with_estimator(config: TrimmingConfig, estimator: E) -> Self {
        Self {
            sanitizer: HistorySanitizer::new(),
            trimmer: BudgetTrimmer::with_estimator(config, estimator),
            enforcer: AlternationEnforcer::new(),
        }
    }

    pub fn trimmer(&self) -> &BudgetTrimmer<E> {
        &self.trimmer
    }

    /// Read a snapshot from `source` and prepare it for one turn.
    pub fn prepare<S>(
        &self,
        source: &S,
        request: TurnRequest<'_>,
        catalog: &dyn ProviderCatalog,
    ) -> Result<PreparedContext, HistoryError>
    where
        S: HistorySource + ?Sized,
    {
        let snapshot = source.history()?;
        info!(
            source = source.source_name(),
            records = snapshot.len(),
            "Preparing context"
        );
        Ok(self.prepare_messages(&snapshot, request, catalog))
    }

    /// Prepare an already-read snapshot. Never fails.
    pub fn prepare_messages(
        &self,
        raw: &[RawMessage],
        request: TurnRequest<'_>,
        catalog: &dyn ProviderCatalog,
    ) -> PreparedContext {
        let (sanitized, sanitize) = self.sanitizer.sanitize_with_report(raw);

        let trimmed = self.trimmer.trim_with_report(
            &sanitized,
            request.system_prompt,
            request.limits.context_window,
            request.limits.max_response_tokens,
        );

        let (repaired, post_trim) = self.sanitizer.repair_correlations(trimmed.messages);

        let capabilities = catalog.capabilities(request.provider_id);
        let messages = self.enforcer.enforce(&repaired, capabilities);

        let report = PipelineReport {
            sanitize,
            trim: trimmed.report,
            post_trim,
            provider_id: request.provider_id.to_string(),
            supports_tool_role: capabilities.supports_tool_role,
            final_messages: messages.len(),
            final_tokens: self.trimmer.estimator().estimate_messages(&messages),
        };

        info!(
            provider = request.provider_id,
            input = report.sanitize.input,
            dropped = report.sanitize.dropped(),
            trim = ?report.trim.decision,
            messages = report.final_messages,
            tokens = report.final_tokens,
            "Context prepared"
        );

        PreparedContext { messages, report }
    }
}
