//! End-to-end tests for the Turnstile context pipeline.
//!
//! These drive the public crate APIs the way the agent loop does: raw
//! history in, provider-ready messages out, with tool calls normalized as
//! the model emits them.

use std::collections::HashMap;
use std::io::Write;

use turnstile_config::{AppConfig, TrimmingConfig};
use turnstile_context::{
    AlternationEnforcer, BudgetTrimmer, ContextPipeline, EmittedToolCall, HistorySanitizer,
    JsonRepairer, ToolCallNormalizer, TrimDecision, TurnRequest, failure_exchange, repair_json,
};
use turnstile_core::history::{RawMessage, RawToolCall};
use turnstile_core::message::{Conversation, Message, Role};
use turnstile_core::provider::{ModelLimits, ProviderCapabilities};

// ── Helpers ──────────────────────────────────────────────────────────────

const TOOL_ROLE: ProviderCapabilities = ProviderCapabilities {
    supports_tool_role: true,
};
const NO_TOOL_ROLE: ProviderCapabilities = ProviderCapabilities {
    supports_tool_role: false,
};

fn catalog() -> HashMap<String, ProviderCapabilities> {
    let mut catalog = HashMap::new();
    catalog.insert("openai".to_string(), TOOL_ROLE);
    catalog.insert("legacy".to_string(), NO_TOOL_ROLE);
    catalog
}

fn request(provider_id: &str, context_window: usize) -> TurnRequest<'_> {
    TurnRequest {
        system_prompt: "You are a careful coding assistant.",
        provider_id,
        limits: ModelLimits {
            context_window,
            max_response_tokens: 4096,
        },
    }
}

fn raw_assistant_calls(content: &str, ids: &[&str]) -> RawMessage {
    RawMessage {
        tool_calls: ids
            .iter()
            .map(|id| RawToolCall {
                id: Some(id.to_string()),
                name: "file_read".into(),
                arguments: serde_json::json!({"path": "src/lib.rs"}),
            })
            .collect(),
        ..RawMessage::new("assistant", content)
    }
}

fn raw_tool(id: &str, content: &str) -> RawMessage {
    RawMessage {
        tool_call_id: Some(id.into()),
        ..RawMessage::new("tool", content)
    }
}

/// Check the three structural invariants every provider depends on.
fn assert_invariants(messages: &[Message]) {
    for (i, msg) in messages.iter().enumerate() {
        // Tool results answer a call declared by the assistant heading their run.
        if msg.role == Role::Tool {
            let id = msg
                .tool_call_id
                .as_deref()
                .unwrap_or_else(|| panic!("tool message {i} has no tool_call_id"));
            let head = messages[..i]
                .iter()
                .rev()
                .find(|m| m.role != Role::Tool)
                .unwrap_or_else(|| panic!("tool message {i} has no declaring assistant"));
            assert!(
                head.tool_calls.iter().any(|c| c.id == id),
                "tool message {i} answers undeclared id {id}"
            );
        }

        // Every declared call is answered before the next non-tool message.
        for call in &msg.tool_calls {
            assert_eq!(msg.role, Role::Assistant);
            let answered = messages[i + 1..]
                .iter()
                .take_while(|m| m.role == Role::Tool)
                .any(|m| m.tool_call_id.as_deref() == Some(call.id.as_str()));
            assert!(answered, "call {} in message {i} is unanswered", call.id);
        }
    }

    // Only tool messages may sit next to a message of the same role.
    for (i, pair) in messages.windows(2).enumerate() {
        assert!(
            pair[0].role != pair[1].role || pair[0].role == Role::Tool,
            "messages {i} and {} are both {}",
            i + 1,
            pair[0].role
        );
    }
}

/// Small deterministic generator so the property runs are reproducible.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.0 >> 33
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

/// A messy history: stale system prompts, unknown roles, orphaned and
/// duplicated results, calls without answers, empty entries.
fn messy_history(rng: &mut Lcg) -> Vec<RawMessage> {
    let len = 5 + rng.below(60) as usize;
    let mut history = Vec::with_capacity(len);
    for i in 0..len {
        let size = 1 + rng.below(3000) as usize;
        let text = "w".repeat(size);
        let id = format!("c{}", rng.below(6));
        let mut record = match rng.below(10) {
            0 => RawMessage::new("system", "stale prompt"),
            1 => RawMessage::new("narrator", &text),
            2 | 3 => RawMessage::new("user", &text),
            4 => RawMessage::new("assistant", &text),
            5 => {
                let second = format!("c{}", rng.below(6));
                let content = if rng.below(2) == 0 { "" } else { "let me look" };
                raw_assistant_calls(content, &[id.as_str(), second.as_str()])
            }
            6 => raw_assistant_calls("", &[id.as_str()]),
            7 | 8 => raw_tool(&id, &text),
            _ => RawMessage::new("user", "  "),
        };
        if i == 0 || rng.below(8) == 0 {
            record.importance = Some(rng.below(15) as f64);
        }
        history.push(record);
    }
    history
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[test]
fn scenario_a_complete_pair_is_untouched() {
    let raw = vec![raw_assistant_calls("", &["c1"]), raw_tool("c1", "fn main() {}")];
    let messages = HistorySanitizer::new().sanitize(&raw);
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].tool_calls.len(), 1);
    assert_eq!(messages[0].tool_calls[0].id, "c1");
    assert_eq!(messages[1].tool_call_id.as_deref(), Some("c1"));
}

#[test]
fn scenario_b_partial_answers_strip_everything() {
    let raw = vec![
        raw_assistant_calls("Reading both files.", &["c1", "c2"]),
        raw_tool("c1", "contents"),
    ];
    let messages = HistorySanitizer::new().sanitize(&raw);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::Assistant);
    assert_eq!(messages[0].content, "Reading both files.");
    assert!(messages[0].tool_calls.is_empty());
}

#[test]
fn scenario_c_tool_result_folded_for_legacy_provider() {
    let out = AlternationEnforcer::new().enforce(&[Message::tool_result("c9", "42")], NO_TOOL_ROLE);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].role, Role::User);
    assert_eq!(out[0].content, "Tool Result (ID: c9):\n42");
}

#[test]
fn scenario_d_missing_value_repaired() {
    let repaired = repair_json(r#"{"offset":,"length":8192}"#).unwrap();
    assert_eq!(repaired, r#"{"offset":null,"length":8192}"#);
    assert!(serde_json::from_str::<serde_json::Value>(&repaired).is_ok());
}

#[test]
fn scenario_e_consecutive_assistants_merged() {
    let out = AlternationEnforcer::new().enforce(
        &[Message::assistant("A"), Message::assistant("B")],
        NO_TOOL_ROLE,
    );
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].role, Role::Assistant);
    assert_eq!(out[0].content, "A\n\nB");
}

// ── Properties ───────────────────────────────────────────────────────────

#[test]
fn enforce_is_idempotent_on_pipeline_input() {
    let enforcer = AlternationEnforcer::new();
    let sanitizer = HistorySanitizer::new();
    let mut rng = Lcg(7);
    for _ in 0..100 {
        let messages = sanitizer.sanitize(&messy_history(&mut rng));
        for caps in [TOOL_ROLE, NO_TOOL_ROLE] {
            let once = enforcer.enforce(&messages, caps);
            assert_eq!(enforcer.enforce(&once, caps), once);
        }
    }
}

#[test]
fn pipeline_output_always_satisfies_invariants() {
    let pipeline = ContextPipeline::default();
    let catalog = catalog();
    let mut rng = Lcg(42);
    for _ in 0..200 {
        let raw = messy_history(&mut rng);
        let window = 2_000 + rng.below(60_000) as usize;
        for provider in ["openai", "legacy"] {
            let prepared = pipeline.prepare_messages(&raw, request(provider, window), &catalog);
            assert_invariants(&prepared.messages);
            if provider == "legacy" {
                assert!(prepared.messages.iter().all(|m| m.role != Role::Tool));
                assert!(prepared.messages.iter().all(|m| m.tool_calls.is_empty()));
            }
        }
    }
}

#[test]
fn fast_path_returns_input_unchanged() {
    let trimmer = BudgetTrimmer::default();
    let mut rng = Lcg(3);
    for _ in 0..50 {
        let messages = HistorySanitizer::new().sanitize(&messy_history(&mut rng));
        let outcome = trimmer.trim_with_report(&messages, "sys", 1_000_000, 4096);
        assert_eq!(outcome.report.decision, TrimDecision::FastPath);
        assert_eq!(outcome.messages, messages);
    }
}

#[test]
fn reserved_first_user_message_survives_trimming() {
    let mut messages = vec![Message::user("the task: port the parser").with_importance(10.0)];
    for i in 0..40 {
        messages.push(Message::assistant(format!("step {i}: {}", "x".repeat(4000))));
        messages.push(Message::user(format!("ok {i}")));
    }

    let outcome = BudgetTrimmer::default().trim_with_report(&messages, "sys", 32_000, 4096);
    assert_eq!(outcome.report.decision, TrimDecision::Trimmed);
    assert!(outcome.report.reserved_retained);
    assert_eq!(outcome.messages[0].content, "the task: port the parser");
    assert!(outcome.messages.len() < messages.len());
}

#[test]
fn repair_leaves_valid_json_alone() {
    let repairer = JsonRepairer::new();
    for valid in [
        r#"{"offset":0,"length":8192}"#,
        r#"{"nested": {"list": [1, 2.5, -3e2, null, true]}}"#,
        r#"{"text": "contains :, and ,} inside a string"}"#,
        "\"just a string\"",
    ] {
        assert_eq!(repairer.repair(valid).as_deref(), Some(valid));
    }
}

// ── Full flows ───────────────────────────────────────────────────────────

#[test]
fn tool_loop_with_normalized_calls_round_trips_through_pipeline() {
    let mut normalizer = ToolCallNormalizer::new();
    let emitted = vec![
        EmittedToolCall::new(None, "file_read", r#"{"path":"src/lib.rs","offset":,}"#),
        EmittedToolCall::new(Some("c2"), "shell", r#"{"cmd": "cargo"#),
    ];

    let mut calls = Vec::new();
    let mut results = Vec::new();
    for outcome in normalizer.normalize_all(emitted) {
        match outcome {
            Ok(call) => {
                results.push(Message::tool_result(&call.id, "pub mod parser;"));
                calls.push(call);
            }
            Err(err) => {
                let (call, result) = failure_exchange(&err);
                calls.push(call);
                results.push(result);
            }
        }
    }
    assert_eq!(calls[0].arguments["offset"], serde_json::Value::Null);
    assert_eq!(calls[1].arguments, serde_json::json!(r#"{"cmd": "cargo"#));

    let mut conv = Conversation::new();
    conv.push(Message::user("what does lib.rs export?"));
    conv.push(Message::assistant_with_tools("", calls));
    for result in results {
        conv.push(result);
    }

    let prepared = ContextPipeline::default()
        .prepare(&conv, request("openai", 128_000), &catalog())
        .unwrap();
    assert_eq!(prepared.messages.len(), 4);
    assert_eq!(prepared.messages[1].tool_calls.len(), 2);
    assert_invariants(&prepared.messages);
    assert!(prepared.report.sanitize.drops.is_empty());
}

#[test]
fn config_file_drives_limits_and_provider_rules() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
default_provider = "legacy"
default_model = "small"

[trimming]
keep_recent = 4
min_budget = 200

[providers.legacy]
supports_tool_role = false

[models.small]
context_window = 4000
max_response_tokens = 1000
"#
    )
    .unwrap();

    let config = AppConfig::load_from(file.path()).unwrap();
    let limits = config.model_limits("small");
    assert_eq!(limits.context_window, 4000);

    let mut raw = vec![RawMessage::new("user", "summarize the log")];
    for i in 0..20 {
        let id = format!("c{i}");
        raw.push(raw_assistant_calls("", &[id.as_str()]));
        raw.push(raw_tool(&id, &"line\n".repeat(200)));
    }

    let pipeline = ContextPipeline::new(config.trimming.clone());
    let prepared = pipeline.prepare_messages(
        &raw,
        TurnRequest {
            system_prompt: "Summarize.",
            provider_id: &config.default_provider,
            limits,
        },
        &config,
    );

    assert_eq!(prepared.report.trim.decision, TrimDecision::Trimmed);
    assert!(!prepared.report.supports_tool_role);
    assert!(prepared.messages.iter().all(|m| m.role != Role::Tool));
    assert!(prepared.report.final_tokens <= limits.context_window);
    assert_invariants(&prepared.messages);
}

#[test]
fn custom_trimming_config_is_used_by_pipeline() {
    let config = TrimmingConfig {
        keep_recent: 2,
        min_budget: 50,
        ..TrimmingConfig::default()
    };
    let raw: Vec<RawMessage> = (0..12)
        .map(|i| {
            let role = if i % 2 == 0 { "user" } else { "assistant" };
            RawMessage::new(role, &format!("{i}:{}", "z".repeat(400)))
        })
        .collect();

    let prepared =
        ContextPipeline::new(config).prepare_messages(&raw, request("openai", 1_000), &catalog());
    assert_eq!(prepared.report.trim.decision, TrimDecision::Trimmed);
    assert!(prepared.messages.len() < raw.len());
    assert_invariants(&prepared.messages);
}

#[test]
fn sanitize_output_of_call_without_results_is_plain_text() {
    let raw = vec![
        RawMessage::new("user", "list files"),
        raw_assistant_calls("Listing.", &["c1"]),
        RawMessage::new("user", "never mind"),
    ];
    let prepared =
        ContextPipeline::default().prepare_messages(&raw, request("openai", 128_000), &catalog());
    assert_eq!(prepared.messages.len(), 3);
    assert!(prepared.messages[1].tool_calls.is_empty());
    assert_eq!(prepared.report.sanitize.stripped_invocations, 1);
}
