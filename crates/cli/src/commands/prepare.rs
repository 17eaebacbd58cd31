//! `turnstile prepare` — Run the context pipeline over a history file.

use clap::Args;
use std::path::{Path, PathBuf};
use turnstile_context::{ContextPipeline, TurnRequest};
use turnstile_core::error::{Error, HistoryError};
use turnstile_core::history::{HistorySource, RawMessage};

#[derive(Args)]
pub struct PrepareArgs {
    /// History file: a JSON array of messages, or one message per line
    #[arg(long)]
    pub history: PathBuf,

    /// File holding the system prompt
    #[arg(long)]
    pub system: Option<PathBuf>,

    /// Target provider (defaults to the configured provider)
    #[arg(long)]
    pub provider: Option<String>,

    /// Target model, used to look up its limits
    #[arg(long)]
    pub model: Option<String>,

    /// Override the model's context window
    #[arg(long)]
    pub context_window: Option<usize>,

    /// Override the model's maximum response tokens
    #[arg(long)]
    pub max_response_tokens: Option<usize>,

    /// Print the pipeline report to stderr
    #[arg(long)]
    pub report: bool,
}

pub fn run(args: PrepareArgs, config_path: Option<&Path>) -> turnstile_core::Result<()> {
    let config = super::load_config(config_path)?;

    let provider = args.provider.unwrap_or_else(|| config.default_provider.clone());
    let model = args.model.unwrap_or_else(|| config.default_model.clone());

    let mut limits = config.model_limits(&model);
    if let Some(window) = args.context_window {
        limits.context_window = window;
    }
    if let Some(max) = args.max_response_tokens {
        limits.max_response_tokens = max;
    }

    tracing::debug!(
        provider = %provider,
        model = %model,
        context_window = limits.context_window,
        max_response_tokens = limits.max_response_tokens,
        "Resolved turn settings"
    );

    let system_prompt = match &args.system {
        Some(path) => std::fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.display().to_string(),
            source,
        })?,
        None => String::new(),
    };

    let source = HistoryFile::new(args.history);
    let pipeline = ContextPipeline::new(config.trimming.clone());
    let prepared = pipeline.prepare(
        &source,
        TurnRequest {
            system_prompt: &system_prompt,
            provider_id: &provider,
            limits,
        },
        &config,
    )?;

    if args.report {
        eprintln!("{}", serde_json::to_string_pretty(&prepared.report)?);
    }
    println!("{}", serde_json::to_string_pretty(&prepared.messages)?);
    Ok(())
}

/// History stored on disk as a JSON array or as JSON Lines.
pub struct HistoryFile {
    path: PathBuf,
    name: String,
}

impl HistoryFile {
    pub fn new(path: PathBuf) -> Self {
        let name = path.display().to_string();
        Self { path, name }
    }
}

impl HistorySource for HistoryFile {
    fn source_name(&self) -> &str {
        &self.name
    }

    fn history(&self) -> Result<Vec<RawMessage>, HistoryError> {
        let text = std::fs::read_to_string(&self.path).map_err(|e| HistoryError::ReadFailed {
            source_name: self.name.clone(),
            reason: e.to_string(),
        })?;
        parse_history(&text)
    }
}

/// Parse a JSON array, or fall back to one record per non-blank line.
fn parse_history(text: &str) -> Result<Vec<RawMessage>, HistoryError> {
    if text.trim_start().starts_with('[') {
        return serde_json::from_str(text).map_err(|e| HistoryError::MalformedRecord {
            index: 0,
            reason: e.to_string(),
        });
    }

    text.lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|e| HistoryError::MalformedRecord {
                index,
                reason: e.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_json_array() {
        let records = parse_history(
            r#"[{"role": "user", "content": "hi"}, {"role": "assistant", "content": "hello"}]"#,
        )
        .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].role.as_deref(), Some("assistant"));
    }

    #[test]
    fn parses_json_lines_skipping_blanks() {
        let text = "{\"role\": \"user\", \"content\": \"a\"}\n\n{\"role\": \"tool\", \"tool_call_id\": \"c1\", \"content\": \"b\"}\n";
        let records = parse_history(text).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].tool_call_id.as_deref(), Some("c1"));
    }

    #[test]
    fn malformed_line_reports_its_index() {
        let text = "{\"role\": \"user\", \"content\": \"a\"}\n{oops\n";
        let err = parse_history(text).unwrap_err();
        assert!(matches!(err, HistoryError::MalformedRecord { index: 1, .. }));
    }

    #[test]
    fn missing_file_is_a_read_failure() {
        let source = HistoryFile::new(PathBuf::from("/nonexistent/turnstile/history.jsonl"));
        assert!(matches!(
            source.history(),
            Err(HistoryError::ReadFailed { .. })
        ));
    }

    #[test]
    fn reads_history_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"role": "user", "content": "question"}}"#).unwrap();
        writeln!(file, r#"{{"role": "system", "content": "stale"}}"#).unwrap();

        let source = HistoryFile::new(file.path().to_path_buf());
        let records = source.history().unwrap();
        assert_eq!(records.len(), 2);
        assert!(source.source_name().ends_with(
            file.path().file_name().unwrap().to_str().unwrap()
        ));
    }

    #[test]
    fn nested_and_null_tool_calls_parse_per_line() {
        let text = concat!(
            r#"{"role": "assistant", "content": null, "tool_calls": [{"id": "c1", "type": "function", "function": {"name": "shell", "arguments": "{\"cmd\":\"ls\"}"}}]}"#,
            "\n",
            r#"{"role": "tool", "tool_call_id": "c1", "content": "a.rs"}"#,
            "\n",
            r#"{"role": "assistant", "content": "done", "tool_calls": null}"#,
            "\n",
        );
        let records = parse_history(text).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].tool_calls[0].name, "shell");
        assert_eq!(
            records[0].tool_calls[0].arguments_value(),
            serde_json::json!({"cmd": "ls"})
        );
        assert!(records[2].tool_calls.is_empty());
    }

    #[test]
    fn unreadable_system_prompt_is_a_read_error() {
        let history = tempfile::NamedTempFile::new().unwrap();
        let args = PrepareArgs {
            history: history.path().to_path_buf(),
            system: Some(PathBuf::from("/nonexistent/turnstile/system.md")),
            provider: None,
            model: None,
            context_window: None,
            max_response_tokens: None,
            report: false,
        };

        let err = run(args, Some(Path::new("/nonexistent/turnstile/config.toml"))).unwrap_err();
        assert!(matches!(err, Error::Read { ref path, .. } if path.ends_with("system.md")));
    }
}
