//! Best-effort repair of malformed tool-call arguments.
//!
//! Models occasionally emit arguments like `{"offset":,"length":8192}` or
//! `{"ratio": .5,}`. A fixed sequence of substitutions handles the common
//! cases; anything still unparseable afterwards is rejected. This is not a
//! grammar fixer.

use regex_lite::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// A compiled substitution.
struct Rule {
    name: &'static str,
    pattern: Regex,
    replacement: &'static str,
}

/// Substitutions, applied in order.
const RULE_SOURCES: [(&str, &str, &str); 3] = [
    ("missing_value", r":\s*([,}\]])", ":null${1}"),
    ("bare_fraction", r":(\s*)(-?)\.(\d)", ":${1}${2}0.${3}"),
    ("trailing_comma", r",(\s*)([}\]])", "${1}${2}"),
];

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    RULE_SOURCES
        .iter()
        .filter_map(|&(name, source, replacement)| match Regex::new(source) {
            Ok(pattern) => Some(Rule {
                name,
                pattern,
                replacement,
            }),
            Err(e) => {
                warn!(rule = name, error = %e, "Skipping JSON repair rule that failed to compile");
                None
            }
        })
        .collect()
});

/// The JSON repairer. Stateless; the rules are compiled once per process.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRepairer;

impl JsonRepairer {
    pub fn new() -> Self {
        Self
    }

    /// Repair `raw` into valid JSON text.
    ///
    /// Valid input comes back unchanged. Substitutions only touch text
    /// outside string literals, so string values survive byte-for-byte.
    /// Returns `None` when the result is still not something `serde_json`
    /// accepts.
    pub fn repair(&self, raw: &str) -> Option<String> {
        if is_valid_json(raw) {
            return Some(raw.to_string());
        }

        let mut repaired = String::with_capacity(raw.len() + 16);
        for segment in split_string_literals(raw) {
            match segment {
                Segment::Literal(text) => repaired.push_str(text),
                Segment::Structure(text) => repaired.push_str(&Self::apply_rules(text)),
            }
        }

        is_valid_json(&repaired).then_some(repaired)
    }

    fn apply_rules(text: &str) -> String {
        let mut text = text.to_string();
        for rule in RULES.iter() {
            let next = rule.pattern.replace_all(&text, rule.replacement);
            if next != text {
                debug!(rule = rule.name, "Applied JSON repair rule");
                text = next.into_owned();
            }
        }
        text
    }
}

/// One-off repair.
pub fn repair_json(raw: &str) -> Option<String> {
    JsonRepairer.repair(raw)
}

fn is_valid_json(text: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(text).is_ok()
}

/// A piece of JSON text: either a quoted string literal (quotes included)
/// or the structure between literals.
#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Literal(&'a str),
    Structure(&'a str),
}

/// Split `text` at string-literal boundaries, honouring `\` escapes. An
/// unterminated literal runs to the end of the text.
fn split_string_literals(text: &str) -> Vec<Segment<'_>> {
    let bytes = text.as_bytes();
    let mut segments = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'"' {
            i += 1;
            continue;
        }
        if start < i {
            segments.push(Segment::Structure(&text[start..i]));
        }

        let open = i;
        i += 1;
        while i < bytes.len() {
            match bytes[i] {
                b'\\' => i += 2,
                b'"' => {
                    i += 1;
                    break;
                }
                _ => i += 1,
            }
        }
        let close = i.min(bytes.len());
        segments.push(Segment::Literal(&text[open..close]));
        start = close;
        i = close;
    }

    if start < bytes.len() {
        segments.push(Segment::Structure(&text[start..]));
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_value_becomes_null() {
        assert_eq!(
            repair_json(r#"{"offset":,"length":8192}"#).as_deref(),
            Some(r#"{"offset":null,"length":8192}"#)
        );
    }

    #[test]
    fn missing_value_before_closing_brace() {
        assert_eq!(
            repair_json(r#"{"a": 1, "b": }"#).as_deref(),
            Some(r#"{"a": 1, "b":null}"#)
        );
    }

    #[test]
    fn bare_fractions_gain_a_leading_zero() {
        let repaired = repair_json(r#"{"ratio": .5, "delta": -.25}"#).unwrap();
        let value: serde_json::Value = serde_json::from_str(&repaired).unwrap();
        assert_eq!(value["ratio"], 0.5);
        assert_eq!(value["delta"], -0.25);
    }

    #[test]
    fn trailing_commas_are_removed() {
        let repaired = repair_json("{\"items\": [1, 2, 3,],\n}").unwrap();
        let value: serde_json::Value = serde_json::from_str(&repaired).unwrap();
        assert_eq!(value["items"], serde_json::json!([1, 2, 3]));
    }

    #[test]
    fn valid_json_is_returned_unchanged() {
        let repairer = JsonRepairer::new();
        for valid in [
            r#"{"path": "src/main.rs"}"#,
            "[]",
            "  {\n  \"a\" : [ 1 , 2 ]\n}  ",
            r#"{"text": "a: ,}"}"#,
            "42",
        ] {
            assert_eq!(repairer.repair(valid).as_deref(), Some(valid));
        }
    }

    #[test]
    fn hopeless_input_is_rejected() {
        assert!(repair_json(r#"{"path": "src/ma"#).is_none());
        assert!(repair_json("not json at all").is_none());
        assert!(repair_json("").is_none());
    }

    #[test]
    fn missing_value_before_closing_bracket_is_still_rejected() {
        // `: ]` becomes `:null]`, which cannot close an object.
        assert!(repair_json(r#"{"a":[1], "b": ]"#).is_none());
    }

    #[test]
    fn string_values_are_not_rewritten() {
        let raw = r#"{"path":"a.js","content":"let a = [1,2,]; f({x: });",}"#;
        assert_eq!(
            repair_json(raw).as_deref(),
            Some(r#"{"path":"a.js","content":"let a = [1,2,]; f({x: });"}"#)
        );
    }

    #[test]
    fn escaped_quotes_do_not_end_a_literal() {
        let raw = r#"{"cmd": "echo \"a: ,}\"", "n": .5,}"#;
        let repaired = repair_json(raw).unwrap();
        let value: serde_json::Value = serde_json::from_str(&repaired).unwrap();
        assert_eq!(value["cmd"], r#"echo "a: ,}""#);
        assert_eq!(value["n"], 0.5);
    }

    #[test]
    fn splitter_separates_literals_from_structure() {
        assert_eq!(
            split_string_literals(r#"{"k": "v\"x", }"#),
            vec![
                Segment::Structure("{"),
                Segment::Literal(r#""k""#),
                Segment::Structure(": "),
                Segment::Literal(r#""v\"x""#),
                Segment::Structure(", }"),
            ]
        );
        assert_eq!(
            split_string_literals(r#"{"open"#),
            vec![Segment::Structure("{"), Segment::Literal(r#""open"#)]
        );
    }

    #[test]
    fn all_rules_compile() {
        assert_eq!(RULES.len(), RULE_SOURCES.len());
    }
}
