//! Budget trimming — fit a valid message sequence into the model's window.
//!
//! # Algorithm
//!
//! 1. `safe_threshold = floor(context_window × safe_ratio)`
//! 2. Fast path: system + history + protocol overhead fits → unchanged
//! 3. Short histories (≤ `keep_recent` messages) are never trimmed
//! 4. `target = max(min_budget, floor((safe_threshold − system) × safety_factor))`
//! 5. The first user message is reserved if its importance is at least
//!    `reserved_importance`; its cost comes off the target up front
//! 6. Older messages are accepted by importance (descending, stable), then
//!    the last `keep_recent` messages in order, both against one running
//!    total. Anything that does not fit is dropped whole.
//! 7. Output: reserved, accepted older in original order, accepted recent
//!
//! The two greedy passes run one after the other and share one running
//! total; the selection is not a joint optimum.

use crate::token::HeuristicEstimator;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use turnstile_config::TrimmingConfig;
use turnstile_core::message::{Message, Role};
use turnstile_core::tokens::TokenEstimator;

/// Why the trimmer returned what it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrimDecision {
    /// Everything fit; input returned unchanged.
    FastPath,
    /// Over budget, but too few messages to trim.
    TooShortToTrim,
    /// Importance-ranked eviction ran.
    Trimmed,
}

/// Statistics for a single trim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrimReport {
    pub decision: TrimDecision,
    /// `floor(context_window × safe_ratio)`.
    pub safe_threshold: usize,
    /// History budget used for eviction (None unless trimming ran).
    pub target: Option<usize>,
    /// The system prompt alone left less than `min_budget`; the floor was
    /// used and the threshold will be exceeded.
    pub floor_applied: bool,
    pub system_tokens: usize,
    pub tokens_before: usize,
    pub tokens_after: usize,
    pub messages_before: usize,
    pub messages_after: usize,
    /// Whether a reserved first user message was found and kept.
    pub reserved_retained: bool,
}

impl TrimReport {
    pub fn dropped(&self) -> usize {
        self.messages_before - self.messages_after
    }

    /// Whether system + history now sit at or under the safe threshold.
    pub fn within_threshold(&self) -> bool {
        self.system_tokens + self.tokens_after <= self.safe_threshold
    }
}

/// Trimmed messages plus what happened.
#[derive(Debug, Clone)]
pub struct TrimOutcome {
    pub messages: Vec<Message>,
    pub report: TrimReport,
}

/// The budget trimmer. Stateless — create one and reuse it.
#[derive(Debug, Clone)]
pub struct BudgetTrimmer<E = HeuristicEstimator> {
    config: TrimmingConfig,
    estimator: E,
}

impl BudgetTrimmer<HeuristicEstimator> {
    /// Create a trimmer using the character heuristic.
    pub fn new(config: TrimmingConfig) -> Self {
        Self::with_estimator(config, HeuristicEstimator)
    }
}

impl Default for BudgetTrimmer<HeuristicEstimator> {
    fn default() -> Self {
        Self::new(TrimmingConfig::default())
    }
}

impl<E: TokenEstimator> BudgetTrimmer<E> {
    /// Create a trimmer with a custom token estimator.
    pub fn with_estimator(config: TrimmingConfig, estimator: E) -> Self {
        Self { config, estimator }
    }

    pub fn config(&self) -> &TrimmingConfig {
        &self.config
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    /// `floor(context_window × safe_ratio)`.
    pub fn safe_threshold(&self, context_window: usize) -> usize {
        floor_scaled(context_window, self.config.safe_ratio)
    }

    /// Fit `messages` into the budget left by `system_prompt`.
    pub fn trim(
        &self,
        messages: &[Message],
        system_prompt: &str,
        context_window: usize,
        max_response_tokens: usize,
    ) -> Vec<Message> {
        self.trim_with_report(messages, system_prompt, context_window, max_response_tokens)
            .messages
    }

    /// Same as [`trim`](Self::trim), also returning a [`TrimReport`].
    pub fn trim_with_report(
        &self,
        messages: &[Message],
        system_prompt: &str,
        context_window: usize,
        max_response_tokens: usize,
    ) -> TrimOutcome {
        let safe_threshold = self.safe_threshold(context_window);
        let system_tokens = self.estimator.estimate(system_prompt);
        let tokens_before = self.estimator.estimate_messages(messages);

        let reserve = context_window.saturating_sub(safe_threshold);
        if max_response_tokens > reserve {
            warn!(
                max_response_tokens,
                reserve, "Response budget exceeds the reserve above the safe threshold"
            );
        }

        let mut report = TrimReport {
            decision: TrimDecision::FastPath,
            safe_threshold,
            target: None,
            floor_applied: false,
            system_tokens,
            tokens_before,
            tokens_after: tokens_before,
            messages_before: messages.len(),
            messages_after: messages.len(),
            reserved_retained: false,
        };

        if system_tokens + tokens_before + self.config.protocol_overhead <= safe_threshold {
            debug!(
                system_tokens,
                tokens_before, safe_threshold, "History fits, no trimming needed"
            );
            return TrimOutcome {
                messages: messages.to_vec(),
                report,
            };
        }

        if messages.len() <= self.config.keep_recent {
            debug!(
                count = messages.len(),
                keep_recent = self.config.keep_recent,
                "Over budget but too short to trim"
            );
            report.decision = TrimDecision::TooShortToTrim;
            return TrimOutcome {
                messages: messages.to_vec(),
                report,
            };
        }

        let (target, floor_applied) = self.history_target(safe_threshold, system_tokens);
        report.decision = TrimDecision::Trimmed;
        report.target = Some(target);
        report.floor_applied = floor_applied;

        let reserved = self.reserved_index(messages);
        let reserved_cost = reserved
            .map(|i| self.estimator.estimate_message(&messages[i]))
            .unwrap_or(0);
        let budget = target.saturating_sub(reserved_cost);

        let candidates: Vec<usize> = (0..messages.len()).filter(|i| Some(*i) != reserved).collect();
        let split = candidates.len().saturating_sub(self.config.keep_recent);
        let (older, recent) = candidates.split_at(split);

        let mut ranked = older.to_vec();
        ranked.sort_by(|a, b| {
            importance_of(&messages[*b])
                .partial_cmp(&importance_of(&messages[*a]))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut used = 0;
        let mut accepted_older = Vec::new();
        for idx in ranked {
            let cost = self.estimator.estimate_message(&messages[idx]);
            if used + cost <= budget {
                used += cost;
                accepted_older.push(idx);
            }
        }
        accepted_older.sort_unstable();

        let mut accepted_recent = Vec::new();
        for &idx in recent {
            let cost = self.estimator.estimate_message(&messages[idx]);
            if used + cost <= budget {
                used += cost;
                accepted_recent.push(idx);
            }
        }

        let trimmed: Vec<Message> = reserved
            .into_iter()
            .chain(accepted_older)
            .chain(accepted_recent)
            .map(|i| messages[i].clone())
            .collect();

        report.reserved_retained = reserved.is_some();
        report.tokens_after = self.estimator.estimate_messages(&trimmed);
        report.messages_after = trimmed.len();

        info!(
            before = report.messages_before,
            after = report.messages_after,
            tokens_before,
            tokens_after = report.tokens_after,
            target,
            "Trimmed history to fit token budget"
        );

        TrimOutcome {
            messages: trimmed,
            report,
        }
    }

    /// History budget once trimming is needed, and whether the floor was hit.
    fn history_target(&self, safe_threshold: usize, system_tokens: usize) -> (usize, bool) {
        let available = safe_threshold.saturating_sub(system_tokens);
        let scaled = floor_scaled(available, self.config.safety_factor);
        if scaled < self.config.min_budget {
            warn!(
                system_tokens,
                safe_threshold,
                min_budget = self.config.min_budget,
                "System prompt leaves less than the minimum history budget; \
                 using the floor and exceeding the safe threshold"
            );
            (self.config.min_budget, true)
        } else {
            (scaled, false)
        }
    }

    /// Index of the first user message, if it carries reserved importance.
    fn reserved_index(&self, messages: &[Message]) -> Option<usize> {
        messages
            .iter()
            .position(|m| m.role == Role::User)
            .filter(|&i| importance_of(&messages[i]) >= self.config.reserved_importance)
    }
}

/// `floor(value × factor)`, tolerant of products that land a hair below an
/// integer in binary floating point (100_000 × 0.58 is 57_999.999…).
fn floor_scaled(value: usize, factor: f64) -> usize {
    (value as f64 * factor + 1e-6).floor() as usize
}

fn importance_of(message: &Message) -> f64 {
    if message.importance.is_finite() {
        message.importance
    } else {
        0.0
    }
}
