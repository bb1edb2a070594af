//! `${NAME}` placeholder expansion over strings and nested JSON values.
//!
//! Unbound names expand to the empty string. Expansion is a single pass:
//! substituted text is not scanned again.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::Value;

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("placeholder pattern is valid"))
}

/// Expand `${NAME}` patterns in a string using `lookup`.
pub fn expand_str<F>(input: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    placeholder()
        .replace_all(input, |caps: &Captures<'_>| lookup(&caps[1]).unwrap_or_default())
        .into_owned()
}

/// Recursively expand every string leaf of `value`.
///
/// Objects and arrays are rebuilt with the same shape; numbers, booleans and
/// null pass through unchanged. The input is never modified.
pub fn expand_value<F>(value: &Value, lookup: &F) -> Value
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        Value::String(s) => Value::String(expand_str(s, lookup)),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), expand_value(v, lookup)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|v| expand_value(v, lookup)).collect()),
        other => other.clone(),
    }
}

/// Lookup backed by the process environment.
pub fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_TUTOR_VAR", "hello");
        let result = expand_str("key = \"${TEST_TUTOR_VAR}\"", &env_lookup);
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_TUTOR_VAR");
    }

    #[test]
    fn test_missing_var_expands_to_empty() {
        let result = expand_str("token=${NONEXISTENT_TUTOR_VAR};", &env_lookup);
        assert_eq!(result, "token=;");
    }

    #[test]
    fn test_no_placeholders_is_noop() {
        let lookup = vars(&[("A", "x")]);
        let value = json!({
            "type": "stdio",
            "command": "npx $A {A} $",
            "args": ["-y", 3, true, null, {"deep": ["a"]}],
            "timeout": 1.5
        });
        assert_eq!(expand_value(&value, &lookup), value);
    }

    #[test]
    fn test_replaces_every_occurrence_at_every_depth() {
        let lookup = vars(&[("TOKEN", "t0k"), ("HOST", "h.test")]);
        let value = json!({
            "url": "https://${HOST}/${TOKEN}/${TOKEN}",
            "env": {"AUTH": "Bearer ${TOKEN}", "nested": {"list": ["${HOST}", ["${TOKEN}"]]}},
            "args": ["--host=${HOST}", 7]
        });
        let expanded = expand_value(&value, &lookup);
        assert_eq!(
            expanded,
            json!({
                "url": "https://h.test/t0k/t0k",
                "env": {"AUTH": "Bearer t0k", "nested": {"list": ["h.test", ["t0k"]]}},
                "args": ["--host=h.test", 7]
            })
        );
    }

    #[test]
    fn test_single_pass_does_not_reexpand() {
        let lookup = vars(&[("A", "${B}"), ("B", "secret")]);
        assert_eq!(expand_str("${A}", &lookup), "${B}");
    }

    #[test]
    fn test_input_left_untouched() {
        let lookup = vars(&[("X", "1")]);
        let value = json!({"k": "${X}"});
        let _ = expand_value(&value, &lookup);
        assert_eq!(value, json!({"k": "${X}"}));
    }
}
