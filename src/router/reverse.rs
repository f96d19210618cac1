//! Reverse fan-out: forwarding server-initiated requests (`roots/list`,
//! `sampling/createMessage`, `elicitation/create`) from an upstream back to
//! the actual connected client of the inbound session that owns it
//! (spec §4.2 "reverse fan-out").
//!
//! Each inbound transport registers a [`ClientCallback`] for its session
//! when it connects; [`ReverseHub`] is the registry both sides share: the
//! upstream side (via [`crate::upstream::connection::ReverseBridge`], an
//! `rmcp::ClientHandler`) calls `forward` when the upstream asks something
//! of the real client, and the inbound transport registers the callback
//! that can actually answer it.
//!
//! There is deliberately no per-upstream session ownership tracked here —
//! an upstream is shared across every session that has it in its visible
//! set, so a server-initiated request is broadcast to every registered
//! client and the results are aggregated (union for `roots/list`,
//! first-success for the rest) rather than routed to one session.

use crate::error::{ProxyError, ProxyResult};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::sync::Arc;

#[async_trait]
pub trait ClientCallback: Send + Sync {
    /// Forward `method`/`params` to the real client and return its result.
    async fn forward(&self, method: &str, params: Value) -> ProxyResult<Value>;
}

/// Methods that originate from an upstream and must be forwarded to the
/// owning session's real client rather than handled locally.
pub const REVERSE_METHODS: &[&str] = &["roots/list", "sampling/createMessage", "elicitation/create"];

pub fn is_reverse_method(method: &str) -> bool {
    REVERSE_METHODS.contains(&method)
}

/// Registry of inbound sessions capable of answering reverse calls.
pub struct ReverseHub {
    callbacks: DashMap<String, Arc<dyn ClientCallback>>,
}

impl ReverseHub {
    pub fn new() -> Self {
        Self { callbacks: DashMap::new() }
    }

    pub fn register(&self, session_id: String, callback: Arc<dyn ClientCallback>) {
        self.callbacks.insert(session_id, callback);
    }

    pub fn unregister(&self, session_id: &str) {
        self.callbacks.remove(session_id);
    }

    pub fn registered_count(&self) -> usize {
        self.callbacks.len()
    }

    /// Broadcast a server-initiated call to every registered client and
    /// aggregate. `roots/list` unions by uri across all responses;
    /// everything else (answers that only make sense from one client, like
    /// a sampling completion) returns the first success.
    pub async fn forward(&self, method: &str, params: Value) -> ProxyResult<Value> {
        let callbacks: Vec<Arc<dyn ClientCallback>> = self.callbacks.iter().map(|e| e.value().clone()).collect();
        if callbacks.is_empty() {
            return Err(ProxyError::NotFound(format!("no inbound client registered to answer '{}'", method)));
        }

        if method == "roots/list" {
            let mut seen = std::collections::HashSet::new();
            let mut roots = Vec::new();
            for callback in &callbacks {
                let Ok(result) = callback.forward(method, params.clone()).await else { continue };
                let Some(items) = result.get("roots").and_then(|v| v.as_array()) else { continue };
                for item in items {
                    if let Some(uri) = item.get("uri").and_then(|v| v.as_str()) {
                        if seen.insert(uri.to_string()) {
                            roots.push(item.clone());
                        }
                    }
                }
            }
            return Ok(json!({ "roots": roots }));
        }

        let mut last_err = None;
        for callback in &callbacks {
            match callback.forward(method, params.clone()).await {
                Ok(result) => return Ok(result),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| ProxyError::NotFound(format!("no inbound client answered '{}'", method))))
    }
}

impl Default for ReverseHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticCallback(Value);

    #[async_trait]
    impl ClientCallback for StaticCallback {
        async fn forward(&self, _method: &str, _params: Value) -> ProxyResult<Value> {
            Ok(self.0.clone())
        }
    }

    struct FailingCallback;

    #[async_trait]
    impl ClientCallback for FailingCallback {
        async fn forward(&self, method: &str, _params: Value) -> ProxyResult<Value> {
            Err(ProxyError::NotFound(format!("cannot answer '{}'", method)))
        }
    }

    struct CountingCallback(Arc<AtomicUsize>, Value);

    #[async_trait]
    impl ClientCallback for CountingCallback {
        async fn forward(&self, _method: &str, _params: Value) -> ProxyResult<Value> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(self.1.clone())
        }
    }

    #[test]
    fn recognizes_reverse_methods() {
        assert!(is_reverse_method("roots/list"));
        assert!(is_reverse_method("sampling/createMessage"));
        assert!(!is_reverse_method("tools/list"));
    }

    #[tokio::test]
    async fn forward_with_no_registered_clients_is_not_found() {
        let hub = ReverseHub::new();
        let result = hub.forward("roots/list", json!({})).await;
        assert!(matches!(result, Err(ProxyError::NotFound(_))));
    }

    #[tokio::test]
    async fn roots_list_unions_across_sessions_by_uri() {
        let hub = ReverseHub::new();
        hub.register("a".to_string(), Arc::new(StaticCallback(json!({ "roots": [{ "uri": "file:///a" }] }))));
        hub.register("b".to_string(), Arc::new(StaticCallback(json!({ "roots": [{ "uri": "file:///a" }, { "uri": "file:///b" }] }))));

        let result = hub.forward("roots/list", json!({})).await.unwrap();
        let uris: Vec<&str> = result["roots"].as_array().unwrap().iter().filter_map(|r| r["uri"].as_str()).collect();
        assert_eq!(uris.len(), 2);
        assert!(uris.contains(&"file:///a"));
        assert!(uris.contains(&"file:///b"));
    }

    #[tokio::test]
    async fn sampling_takes_first_success_and_skips_failures() {
        let hub = ReverseHub::new();
        let calls = Arc::new(AtomicUsize::new(0));
        hub.register("failing".to_string(), Arc::new(FailingCallback));
        hub.register("answering".to_string(), Arc::new(CountingCallback(calls.clone(), json!({ "content": "ok" }))));

        let result = hub.forward("sampling/createMessage", json!({})).await.unwrap();
        assert_eq!(result["content"], "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unregister_removes_a_session_from_future_broadcasts() {
        let hub = ReverseHub::new();
        hub.register("a".to_string(), Arc::new(FailingCallback));
        hub.unregister("a");
        assert_eq!(hub.registered_count(), 0);
        let result = hub.forward("roots/list", json!({})).await;
        assert!(matches!(result, Err(ProxyError::NotFound(_))));
    }
}
