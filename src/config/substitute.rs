//! `${VAR}` environment variable substitution (spec §4.6, §6).

use once_cell::sync::Lazy;
use regex::Regex;

static VAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"));

/// Replace every `${NAME}` occurrence in `input` with `std::env::var(NAME)`.
/// Unresolved variables are left untouched (logged at `warn`), matching the
/// teacher's practice of never hard-failing on recoverable config issues.
pub fn substitute(input: &str) -> String {
    VAR_RE
        .replace_all(input, |caps: &regex::Captures| {
            let name = &caps[1];
            match std::env::var(name) {
                Ok(val) => val,
                Err(_) => {
                    tracing::warn!("environment variable '{}' is not set; leaving placeholder", name);
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

/// Recursively substitute through a JSON value's string leaves.
pub fn substitute_json(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::String(s) => *s = substitute(s),
        serde_json::Value::Array(arr) => arr.iter_mut().for_each(substitute_json),
        serde_json::Value::Object(map) => map.values_mut().for_each(substitute_json),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_var() {
        std::env::set_var("AGG_MCP_TEST_VAR", "hello");
        assert_eq!(substitute("value=${AGG_MCP_TEST_VAR}"), "value=hello");
    }

    #[test]
    fn leaves_unknown_var_untouched() {
        std::env::remove_var("AGG_MCP_TEST_VAR_UNSET");
        assert_eq!(
            substitute("value=${AGG_MCP_TEST_VAR_UNSET}"),
            "value=${AGG_MCP_TEST_VAR_UNSET}"
        );
    }

    #[test]
    fn substitutes_nested_json() {
        std::env::set_var("AGG_MCP_TEST_NESTED", "9000");
        let mut v = serde_json::json!({"port": "${AGG_MCP_TEST_NESTED}", "list": ["${AGG_MCP_TEST_NESTED}"]});
        substitute_json(&mut v);
        assert_eq!(v["port"], "9000");
        assert_eq!(v["list"][0], "9000");
    }
}
