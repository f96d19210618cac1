//! Upstream descriptor: the configuration-supplied shape of a single
//! upstream server (spec §3, §6).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `^[A-Za-z][A-Za-z0-9_-]{0,49}$` — identity regex for upstream names.
static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]{0,49}$").expect("valid regex"));

pub fn is_valid_upstream_name(name: &str) -> bool {
    NAME_RE.is_match(name)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Stdio,
    Http,
    Sse,
}

/// Configuration for a single upstream MCP server (spec §3 `UpstreamDescriptor`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamDescriptor {
    /// Unique name; identity of this upstream. Must match [`is_valid_upstream_name`].
    pub name: String,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub transport_type: Option<TransportKind>,

    // stdio fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default)]
    pub restart_on_exit: bool,
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,

    // http/sse fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_provider: Option<String>,

    // common
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,
}

fn default_max_restarts() -> u32 {
    5
}

fn default_restart_delay_ms() -> u64 {
    1000
}

impl UpstreamDescriptor {
    /// Infer the transport when `type` was omitted, per spec §6.
    pub fn transport(&self) -> Result<TransportKind, String> {
        if let Some(t) = self.transport_type {
            return Ok(t);
        }
        if self.command.is_some() {
            return Ok(TransportKind::Stdio);
        }
        if self.url.is_some() {
            return Ok(TransportKind::Http);
        }
        Err(format!(
            "upstream '{}': cannot infer transport type — specify `type` or `command`/`url`",
            self.name
        ))
    }

    /// Effective request timeout: `requestTimeout ?? timeout ?? None` (spec §4.1).
    pub fn effective_request_timeout_ms(&self) -> Option<u64> {
        self.request_timeout_ms.or(self.timeout_ms)
    }

    /// Normalized (lower-cased, trimmed) tag set for filtering (spec §3).
    pub fn normalized_tags(&self) -> Vec<String> {
        self.tags
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect()
    }

    /// Fields that, if changed between two descriptors, require recreating
    /// the transport rather than just updating metadata in place (spec §4.6).
    pub fn transport_affecting_fields_changed(&self, other: &UpstreamDescriptor) -> bool {
        self.transport_type != other.transport_type
            || self.command != other.command
            || self.args != other.args
            || self.env != other.env
            || self.cwd != other.cwd
            || self.url != other.url
            || self.headers != other.headers
            || self.oauth_provider != other.oauth_provider
            || self.disabled != other.disabled
    }
}

pub fn validate_descriptor(d: &UpstreamDescriptor) -> Result<(), String> {
    if !is_valid_upstream_name(&d.name) {
        return Err(format!(
            "upstream name '{}' does not match ^[A-Za-z][A-Za-z0-9_-]{{0,49}}$",
            d.name
        ));
    }

    match d.transport()? {
        TransportKind::Stdio => {
            if d.command.as_ref().map_or(true, |c| c.trim().is_empty()) {
                return Err(format!(
                    "upstream '{}': stdio transport requires `command`",
                    d.name
                ));
            }
        }
        TransportKind::Http | TransportKind::Sse => {
            if d.url.as_ref().map_or(true, |u| u.trim().is_empty()) {
                return Err(format!(
                    "upstream '{}': http/sse transport requires `url`",
                    d.name
                ));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_regex_accepts_alnum_underscore_dash() {
        assert!(is_valid_upstream_name("alpha"));
        assert!(is_valid_upstream_name("alpha-beta_2"));
        assert!(is_valid_upstream_name("A"));
    }

    #[test]
    fn name_regex_rejects_slash_and_space_and_leading_digit() {
        assert!(!is_valid_upstream_name("alpha/beta"));
        assert!(!is_valid_upstream_name("alpha beta"));
        assert!(!is_valid_upstream_name("1alpha"));
        assert!(!is_valid_upstream_name(""));
    }

    #[test]
    fn name_regex_rejects_too_long() {
        let long = "a".repeat(51);
        assert!(!is_valid_upstream_name(&long));
        let ok = "a".repeat(50);
        assert!(is_valid_upstream_name(&ok));
    }

    fn stdio(name: &str) -> UpstreamDescriptor {
        UpstreamDescriptor {
            name: name.to_string(),
            transport_type: Some(TransportKind::Stdio),
            command: Some("echo".into()),
            args: None,
            env: None,
            cwd: None,
            restart_on_exit: false,
            max_restarts: 5,
            restart_delay_ms: 1000,
            url: None,
            headers: None,
            oauth_provider: None,
            tags: vec![],
            disabled: false,
            timeout_ms: None,
            connection_timeout_ms: None,
            request_timeout_ms: None,
        }
    }

    #[test]
    fn validate_rejects_missing_command_for_stdio() {
        let mut d = stdio("alpha");
        d.command = None;
        assert!(validate_descriptor(&d).is_err());
    }

    #[test]
    fn validate_rejects_bad_name() {
        let d = stdio("bad name");
        assert!(validate_descriptor(&d).is_err());
    }

    #[test]
    fn effective_timeout_prefers_request_timeout() {
        let mut d = stdio("alpha");
        d.timeout_ms = Some(100);
        d.request_timeout_ms = Some(200);
        assert_eq!(d.effective_request_timeout_ms(), Some(200));
        d.request_timeout_ms = None;
        assert_eq!(d.effective_request_timeout_ms(), Some(100));
    }

    #[test]
    fn normalized_tags_lowercases_and_trims() {
        let mut d = stdio("alpha");
        d.tags = vec![" PROD ".into(), "Api".into(), "".into()];
        assert_eq!(d.normalized_tags(), vec!["prod".to_string(), "api".to_string()]);
    }
}
