//! Opaque pagination cursors (spec §4.2, §4.3): a cursor is scoped to
//! exactly one upstream at a time — "list the next page of upstream X's
//! tools" — never a position across the whole aggregate.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};

/// Cursors longer than this are rejected outright rather than decoded —
/// bounds how much garbage a malicious/buggy client can make us base64-decode.
pub const MAX_CURSOR_LEN: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cursor {
    pub upstream: String,
    /// Opaque to us — whatever the upstream's own `nextCursor` said, or an
    /// offset for upstreams that only support offset-based paging.
    pub upstream_cursor: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorError(pub String);

impl std::fmt::Display for CursorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid cursor: {}", self.0)
    }
}
impl std::error::Error for CursorError {}

pub fn encode(cursor: &Cursor) -> String {
    let json = serde_json::to_vec(cursor).expect("Cursor always serializes");
    URL_SAFE_NO_PAD.encode(json)
}

/// Decode a cursor string. Any failure (too long, not valid base64, not
/// valid JSON, wrong shape) returns `Err` — callers should treat that as
/// "start over from the first visible upstream" rather than erroring the
/// whole request (spec §4.3 edge case).
pub fn decode(raw: &str) -> Result<Cursor, CursorError> {
    if raw.is_empty() {
        return Err(CursorError("cursor is empty".to_string()));
    }
    if raw.len() > MAX_CURSOR_LEN {
        return Err(CursorError(format!("cursor exceeds {} characters", MAX_CURSOR_LEN)));
    }
    if !raw.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_') {
        return Err(CursorError("cursor contains characters outside the URL-safe base64 alphabet".to_string()));
    }

    let bytes = URL_SAFE_NO_PAD.decode(raw).map_err(|e| CursorError(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| CursorError(e.to_string()))
}

/// Decode a cursor, falling back to "start of `fallback_upstream`" on any
/// decode failure instead of propagating the error.
pub fn decode_or_fallback(raw: Option<&str>, fallback_upstream: &str) -> Cursor {
    match raw {
        Some(r) => decode(r).unwrap_or_else(|e| {
            tracing::warn!("pagination cursor invalid ({}), restarting from '{}'", e, fallback_upstream);
            Cursor { upstream: fallback_upstream.to_string(), upstream_cursor: String::new() }
        }),
        None => Cursor { upstream: fallback_upstream.to_string(), upstream_cursor: String::new() },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_round_trips() {
        let cursor = Cursor { upstream: "weather".to_string(), upstream_cursor: "page2".to_string() };
        let encoded = encode(&cursor);
        assert_eq!(decode(&encoded).unwrap(), cursor);
    }

    #[test]
    fn rejects_cursor_over_max_length() {
        let huge = "a".repeat(MAX_CURSOR_LEN + 1);
        assert!(decode(&huge).is_err());
    }

    #[test]
    fn rejects_non_base64_charset() {
        assert!(decode("not valid base64!!").is_err());
    }

    #[test]
    fn rejects_empty_cursor() {
        assert!(decode("").is_err());
    }

    #[test]
    fn fallback_restarts_from_given_upstream_on_garbage_input() {
        let cursor = decode_or_fallback(Some("%%%not-a-cursor%%%"), "first-upstream");
        assert_eq!(cursor.upstream, "first-upstream");
        assert_eq!(cursor.upstream_cursor, "");
    }

    #[test]
    fn fallback_handles_missing_cursor() {
        let cursor = decode_or_fallback(None, "first-upstream");
        assert_eq!(cursor.upstream, "first-upstream");
    }
}
