//! The inbound method-dispatch table (spec §4.2): every JSON-RPC method an
//! aggregated session can call, routed to one or all visible upstreams.
//!
//! Generalizes the teacher's `handle_single_request` (`proxy/server.rs`),
//! which forwarded a method verbatim to exactly one `:id`-selected upstream,
//! into real aggregation: `tools/list` fans out and merges, `tools/call`
//! routes by namespaced name, and visibility is filtered per-session
//! through the tag engine instead of every upstream always being visible.

use crate::config::template::SessionContext;
use crate::config::UpstreamDescriptor;
use crate::error::{ProxyError, ProxyResult};
use crate::filter::PresetStore;
use crate::router::cursor;
use crate::router::namespace;
use crate::router::notify::{ListChangedKind, ListChangedNotifier};
use crate::router::pagination::{self, Page, PaginationMode};
use crate::router::reverse::is_reverse_method;
use crate::router::session::{InboundSession, SessionTable, VisibilityMode};
use crate::upstream::UpstreamManager;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub struct Router {
    pub upstreams: Arc<UpstreamManager>,
    pub sessions: Arc<SessionTable>,
    pub presets: Arc<PresetStore>,
    pub notifier: Arc<ListChangedNotifier>,
    pub agent_name: String,
}

impl Router {
    /// Upstream names visible to this session: connected, not disabled, and
    /// matching its tag filter (or all of them, if unfiltered).
    ///
    /// Rendered template instances (spec §9) are never picked up by the
    /// generic scan below — a private instance is keyed by another
    /// session's id and a shareable one might belong to a render no session
    /// here asked for. Instead each session's own instances, recorded at
    /// creation time, are unioned in explicitly and tag-filtered the same
    /// way as everything else.
    pub async fn visible_upstreams(&self, session: &InboundSession) -> ProxyResult<Vec<String>> {
        let query = session.resolve_query(&self.presets);
        let names = self.upstreams.names().await;
        let mut visible = Vec::new();

        for name in names {
            if self.upstreams.is_template_instance(&name).await {
                continue;
            }
            let Some(conn) = self.upstreams.get(&name).await else { continue };
            if conn.descriptor.disabled {
                continue;
            }
            match &query {
                None => visible.push(name),
                Some(q) => {
                    let tags: std::collections::HashSet<String> = conn.descriptor.normalized_tags().into_iter().collect();
                    if q.matches(&tags) {
                        visible.push(name);
                    }
                }
            }
        }

        for name in session.template_upstreams().await {
            let Some(conn) = self.upstreams.get(&name).await else { continue };
            match &query {
                None => visible.push(name),
                Some(q) => {
                    let tags: std::collections::HashSet<String> = conn.descriptor.normalized_tags().into_iter().collect();
                    if q.matches(&tags) {
                        visible.push(name);
                    }
                }
            }
        }
        Ok(visible)
    }

    async fn require_session(&self, session_id: &str, now_ms: i64) -> ProxyResult<Arc<InboundSession>> {
        self.sessions
            .get(session_id, now_ms)
            .ok_or_else(|| ProxyError::NotFound(format!("session '{}' not found", session_id)))
    }

    /// Create a new inbound session, rendering and connecting any configured
    /// templates against `context` (spec §9) before the session becomes
    /// visible to the rest of the router.
    pub async fn create_session(
        &self,
        session_id: String,
        preset: Option<String>,
        tag_query: Option<crate::filter::FilterQuery>,
        pagination_mode: PaginationMode,
        context: SessionContext,
        now_ms: i64,
    ) -> Arc<InboundSession> {
        let visibility = match (preset, tag_query) {
            (Some(name), _) => VisibilityMode::Preset(name),
            (None, Some(q)) => VisibilityMode::Query(q),
            (None, None) => VisibilityMode::All,
        };
        let session = self.sessions.create(session_id.clone(), visibility, pagination_mode, context.clone(), now_ms);

        let template_names = self.upstreams.template_names().await;
        if !template_names.is_empty() {
            let mut instances = Vec::with_capacity(template_names.len());
            for template_name in template_names {
                match self.upstreams.ensure_template(&template_name, &session_id, &context).await {
                    Ok(key) => instances.push(key),
                    Err(e) => tracing::warn!("session '{}': template '{}' failed: {}", session_id, template_name, e),
                }
            }
            session.set_template_upstreams(instances).await;
        }

        session
    }

    /// Top-level entry point: route one JSON-RPC method call for `session_id`.
    pub async fn dispatch(&self, session_id: &str, method: &str, params: Value, now_ms: i64) -> ProxyResult<Value> {
        if is_reverse_method(method) {
            // Reverse fan-out (roots/sampling/elicitation) is initiated by an
            // upstream calling back into its owning session's real client,
            // not by an inbound request — nothing upstream-facing should
            // ever dispatch one of these methods inbound.
            return Err(ProxyError::NotFound(format!("method '{}' is server-initiated only", method)));
        }

        match method {
            "initialize" => self.handle_initialize(params),
            "ping" => Ok(json!({})),
            "tools/list" => {
                let session = self.require_session(session_id, now_ms).await?;
                self.list_tools(&session, params).await
            }
            "tools/call" => {
                let session = self.require_session(session_id, now_ms).await?;
                self.call_tool(&session, params).await
            }
            "resources/list" => {
                let session = self.require_session(session_id, now_ms).await?;
                self.list_resources(&session, params).await
            }
            "resources/read" => {
                let session = self.require_session(session_id, now_ms).await?;
                self.read_resource(&session, params).await
            }
            "resources/templates/list" => {
                let session = self.require_session(session_id, now_ms).await?;
                self.list_resource_templates(&session, params).await
            }
            "prompts/list" => {
                let session = self.require_session(session_id, now_ms).await?;
                self.list_prompts(&session, params).await
            }
            "prompts/get" => {
                let session = self.require_session(session_id, now_ms).await?;
                self.get_prompt(&session, params).await
            }
            "resources/subscribe" => {
                let session = self.require_session(session_id, now_ms).await?;
                self.subscribe_resource(&session, params).await
            }
            "resources/unsubscribe" => {
                let session = self.require_session(session_id, now_ms).await?;
                self.unsubscribe_resource(&session, params).await
            }
            "completion/complete" => {
                let session = self.require_session(session_id, now_ms).await?;
                self.complete(&session, params).await
            }
            "logging/setLevel" => {
                let session = self.require_session(session_id, now_ms).await?;
                self.set_level_all(&session, params).await
            }
            other => Err(ProxyError::NotFound(format!("method not found: {}", other))),
        }
    }

    fn handle_initialize(&self, _params: Value) -> ProxyResult<Value> {
        Ok(json!({
            "protocolVersion": "2025-06-18",
            "capabilities": {
                "tools": { "listChanged": true },
                "resources": { "listChanged": true, "subscribe": true },
                "completions": {},
                "prompts": { "listChanged": true },
                "logging": {},
            },
            "serverInfo": { "name": self.agent_name, "version": env!("CARGO_PKG_VERSION") },
        }))
    }

    pub(crate) async fn list_tools(&self, session: &InboundSession, params: Value) -> ProxyResult<Value> {
        let visible = self.visible_upstreams(session).await?;
        let incoming_cursor = params.get("cursor").and_then(|v| v.as_str());

        let fetch = |upstream: &str, upstream_cursor: Option<String>| {
            let upstream = upstream.to_string();
            async move {
                let req_params = match &upstream_cursor {
                    Some(c) => json!({ "cursor": c }),
                    None => json!({}),
                };
                let result = self.upstreams.invoke(&upstream, "tools/list", req_params, None).await?;
                let tools = result.get("tools").and_then(|v| v.as_array()).cloned().unwrap_or_default();
                let namespaced: Vec<Value> = tools.into_iter().map(|t| namespace_field(t, &upstream, "name")).collect();
                let next = result.get("nextCursor").and_then(|v| v.as_str()).map(|s| s.to_string());
                Ok(Page { items: namespaced, next_upstream_cursor: next })
            }
        };

        match session.pagination_mode {
            PaginationMode::Disabled => {
                let tools = pagination::drain_all(&visible, fetch).await?;
                Ok(json!({ "tools": tools }))
            }
            PaginationMode::Enabled => {
                let (tools, next) = pagination::fetch_one_page(&visible, incoming_cursor, fetch).await?;
                let mut response = json!({ "tools": tools });
                if let Some(c) = next {
                    response["nextCursor"] = json!(c);
                }
                Ok(response)
            }
        }
    }

    pub(crate) async fn call_tool(&self, session: &InboundSession, params: Value) -> ProxyResult<Value> {
        let namespaced_name = params
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProxyError::InvalidParams("tools/call requires a 'name'".to_string()))?;

        let (upstream_name, original_name) = namespace::decode(namespaced_name)
            .ok_or_else(|| ProxyError::NotFound(format!("unknown tool '{}'", namespaced_name)))?;

        self.ensure_visible(session, upstream_name).await?;

        let mut forwarded = params.clone();
        forwarded["name"] = json!(original_name);
        self.upstreams.invoke(upstream_name, "tools/call", forwarded, None).await
    }

    pub(crate) async fn list_resources(&self, session: &InboundSession, params: Value) -> ProxyResult<Value> {
        let visible = self.visible_upstreams(session).await?;
        let incoming_cursor = params.get("cursor").and_then(|v| v.as_str());

        let fetch = |upstream: &str, upstream_cursor: Option<String>| {
            let upstream = upstream.to_string();
            async move {
                let req_params = match &upstream_cursor {
                    Some(c) => json!({ "cursor": c }),
                    None => json!({}),
                };
                let result = self.upstreams.invoke(&upstream, "resources/list", req_params, None).await?;
                let resources = result.get("resources").and_then(|v| v.as_array()).cloned().unwrap_or_default();
                let namespaced: Vec<Value> = resources.into_iter().map(|r| namespace_field(r, &upstream, "name")).collect();
                let next = result.get("nextCursor").and_then(|v| v.as_str()).map(|s| s.to_string());
                Ok(Page { items: namespaced, next_upstream_cursor: next })
            }
        };

        match session.pagination_mode {
            PaginationMode::Disabled => {
                let resources = pagination::drain_all(&visible, fetch).await?;
                Ok(json!({ "resources": resources }))
            }
            PaginationMode::Enabled => {
                let (resources, next) = pagination::fetch_one_page(&visible, incoming_cursor, fetch).await?;
                let mut response = json!({ "resources": resources });
                if let Some(c) = next {
                    response["nextCursor"] = json!(c);
                }
                Ok(response)
            }
        }
    }

    async fn read_resource(&self, session: &InboundSession, params: Value) -> ProxyResult<Value> {
        let uri = params
            .get("uri")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProxyError::InvalidParams("resources/read requires a 'uri'".to_string()))?;

        // Resource URIs are not namespaced (they're already globally scoped
        // by scheme/host), so we have to ask every visible upstream in turn
        // and take the first one that recognizes it.
        let visible = self.visible_upstreams(session).await?;
        for upstream in &visible {
            match self.upstreams.invoke(upstream, "resources/read", json!({ "uri": uri }), None).await {
                Ok(result) => return Ok(result),
                Err(ProxyError::UpstreamProtocol { .. }) | Err(ProxyError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(ProxyError::NotFound(format!("resource '{}' not found on any visible upstream", uri)))
    }

    /// Same "ask every visible upstream, take the first that recognizes the
    /// uri" strategy as `read_resource` — resource uris aren't namespaced.
    async fn subscribe_resource(&self, session: &InboundSession, params: Value) -> ProxyResult<Value> {
        let uri = params
            .get("uri")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProxyError::InvalidParams("resources/subscribe requires a 'uri'".to_string()))?;

        let visible = self.visible_upstreams(session).await?;
        for upstream in &visible {
            match self.upstreams.invoke(upstream, "resources/subscribe", json!({ "uri": uri }), None).await {
                Ok(result) => return Ok(result),
                Err(ProxyError::UpstreamProtocol { .. }) | Err(ProxyError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(ProxyError::NotFound(format!("resource '{}' not found on any visible upstream", uri)))
    }

    async fn unsubscribe_resource(&self, session: &InboundSession, params: Value) -> ProxyResult<Value> {
        let uri = params
            .get("uri")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProxyError::InvalidParams("resources/unsubscribe requires a 'uri'".to_string()))?;

        let visible = self.visible_upstreams(session).await?;
        for upstream in &visible {
            match self.upstreams.invoke(upstream, "resources/unsubscribe", json!({ "uri": uri }), None).await {
                Ok(result) => return Ok(result),
                Err(ProxyError::UpstreamProtocol { .. }) | Err(ProxyError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(ProxyError::NotFound(format!("resource '{}' not found on any visible upstream", uri)))
    }

    /// `completion/complete`'s `ref` names either a prompt (namespaced, like
    /// `prompts/get`) or a resource (uri-scoped, like `resources/read`).
    async fn complete(&self, session: &InboundSession, params: Value) -> ProxyResult<Value> {
        let reference = params.get("ref").ok_or_else(|| ProxyError::InvalidParams("completion/complete requires a 'ref'".to_string()))?;
        let ref_type = reference.get("type").and_then(|v| v.as_str()).unwrap_or_default();

        if ref_type == "ref/resource" {
            let uri = reference
                .get("uri")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ProxyError::InvalidParams("completion/complete ref/resource requires a 'uri'".to_string()))?;
            let visible = self.visible_upstreams(session).await?;
            for upstream in &visible {
                match self.upstreams.invoke(upstream, "completion/complete", params.clone(), None).await {
                    Ok(result) => return Ok(result),
                    Err(ProxyError::UpstreamProtocol { .. }) | Err(ProxyError::NotFound(_)) => continue,
                    Err(e) => return Err(e),
                }
            }
            return Err(ProxyError::NotFound(format!("resource '{}' not found on any visible upstream", uri)));
        }

        let namespaced_name = reference
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProxyError::InvalidParams("completion/complete ref requires a 'name'".to_string()))?;
        let (upstream_name, original_name) = namespace::decode(namespaced_name)
            .ok_or_else(|| ProxyError::NotFound(format!("unknown completion target '{}'", namespaced_name)))?;

        self.ensure_visible(session, upstream_name).await?;

        let mut forwarded = params.clone();
        forwarded["ref"]["name"] = json!(original_name);
        self.upstreams.invoke(upstream_name, "completion/complete", forwarded, None).await
    }

    async fn list_resource_templates(&self, session: &InboundSession, _params: Value) -> ProxyResult<Value> {
        let visible = self.visible_upstreams(session).await?;
        let mut all = Vec::new();
        for upstream in &visible {
            if let Ok(result) = self.upstreams.invoke(upstream, "resources/templates/list", json!({}), None).await {
                let templates = result.get("resourceTemplates").and_then(|v| v.as_array()).cloned().unwrap_or_default();
                all.extend(templates.into_iter().map(|t| namespace_field(t, upstream, "name")));
            }
        }
        Ok(json!({ "resourceTemplates": all }))
    }

    pub(crate) async fn list_prompts(&self, session: &InboundSession, params: Value) -> ProxyResult<Value> {
        let visible = self.visible_upstreams(session).await?;
        let incoming_cursor = params.get("cursor").and_then(|v| v.as_str());

        let fetch = |upstream: &str, upstream_cursor: Option<String>| {
            let upstream = upstream.to_string();
            async move {
                let req_params = match &upstream_cursor {
                    Some(c) => json!({ "cursor": c }),
                    None => json!({}),
                };
                let result = self.upstreams.invoke(&upstream, "prompts/list", req_params, None).await?;
                let prompts = result.get("prompts").and_then(|v| v.as_array()).cloned().unwrap_or_default();
                let namespaced: Vec<Value> = prompts.into_iter().map(|p| namespace_field(p, &upstream, "name")).collect();
                let next = result.get("nextCursor").and_then(|v| v.as_str()).map(|s| s.to_string());
                Ok(Page { items: namespaced, next_upstream_cursor: next })
            }
        };

        match session.pagination_mode {
            PaginationMode::Disabled => {
                let prompts = pagination::drain_all(&visible, fetch).await?;
                Ok(json!({ "prompts": prompts }))
            }
            PaginationMode::Enabled => {
                let (prompts, next) = pagination::fetch_one_page(&visible, incoming_cursor, fetch).await?;
                let mut response = json!({ "prompts": prompts });
                if let Some(c) = next {
                    response["nextCursor"] = json!(c);
                }
                Ok(response)
            }
        }
    }

    async fn get_prompt(&self, session: &InboundSession, params: Value) -> ProxyResult<Value> {
        let namespaced_name = params
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProxyError::InvalidParams("prompts/get requires a 'name'".to_string()))?;

        let (upstream_name, original_name) = namespace::decode(namespaced_name)
            .ok_or_else(|| ProxyError::NotFound(format!("unknown prompt '{}'", namespaced_name)))?;

        self.ensure_visible(session, upstream_name).await?;

        let mut forwarded = params.clone();
        forwarded["name"] = json!(original_name);
        self.upstreams.invoke(upstream_name, "prompts/get", forwarded, None).await
    }

    /// `logging/setLevel` has no single target — apply it to every visible
    /// upstream and report which ones failed (spec §4.2).
    async fn set_level_all(&self, session: &InboundSession, params: Value) -> ProxyResult<Value> {
        let visible = self.visible_upstreams(session).await?;
        let mut failed = Vec::new();
        for upstream in &visible {
            if let Err(e) = self.upstreams.invoke(upstream, "logging/setLevel", params.clone(), None).await {
                tracing::warn!("upstream '{}': logging/setLevel failed: {}", upstream, e);
                failed.push(upstream.clone());
            }
        }
        Ok(json!({ "failedUpstreams": failed }))
    }

    async fn ensure_visible(&self, session: &InboundSession, upstream_name: &str) -> ProxyResult<()> {
        let visible = self.visible_upstreams(session).await?;
        if visible.iter().any(|u| u == upstream_name) {
            Ok(())
        } else {
            Err(ProxyError::NotVisible(upstream_name.to_string()))
        }
    }

    pub fn notify_tools_changed(&self) {
        self.notifier.trigger(ListChangedKind::Tools);
    }

    pub fn notify_resources_changed(&self) {
        self.notifier.trigger(ListChangedKind::Resources);
    }

    pub fn notify_prompts_changed(&self) {
        self.notifier.trigger(ListChangedKind::Prompts);
    }
}

fn namespace_field(mut item: Value, upstream: &str, field: &str) -> Value {
    if let Some(name) = item.get(field).and_then(|v| v.as_str()) {
        let encoded = namespace::encode(upstream, name);
        item[field] = json!(encoded);
    }
    item
}

/// Helper used by the upstream manager's reload path and config watcher to
/// report which upstreams a descriptor map would make visible, without
/// requiring a live session (used for `/mcps` style introspection).
pub fn static_tag_filter(descriptors: &HashMap<String, UpstreamDescriptor>, query: &crate::filter::FilterQuery) -> Vec<String> {
    let mut visible: Vec<String> = descriptors
        .iter()
        .filter(|(_, d)| !d.disabled)
        .filter(|(_, d)| {
            let tags: std::collections::HashSet<String> = d.normalized_tags().into_iter().collect();
            query.matches(&tags)
        })
        .map(|(name, _)| name.clone())
        .collect();
    visible.sort();
    visible
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, TransportKind};
    use crate::router::pagination::PaginationMode;
    use std::time::Duration;

    fn descriptor(name: &str, tags: &[&str]) -> UpstreamDescriptor {
        UpstreamDescriptor {
            name: name.to_string(),
            transport_type: Some(TransportKind::Stdio),
            command: Some("unused".into()),
            args: None,
            env: None,
            cwd: None,
            restart_on_exit: false,
            max_restarts: 5,
            restart_delay_ms: 1000,
            url: None,
            headers: None,
            oauth_provider: None,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            disabled: false,
            timeout_ms: None,
            connection_timeout_ms: None,
            request_timeout_ms: None,
        }
    }

    async fn test_router() -> Router {
        let config = AppConfig::default();
        let upstreams = Arc::new(UpstreamManager::new("aggregator".to_string(), &config, HashMap::new()));
        let mut descriptors = HashMap::new();
        descriptors.insert("weather".to_string(), descriptor("weather", &["prod"]));
        descriptors.insert("internal-tool".to_string(), descriptor("internal-tool", &["internal"]));
        upstreams.connect_all(descriptors).await;

        Router {
            upstreams,
            sessions: Arc::new(SessionTable::new(Duration::from_secs(3600))),
            presets: Arc::new(PresetStore::new()),
            notifier: Arc::new(ListChangedNotifier::new(Duration::from_millis(50))),
            agent_name: "aggregator".to_string(),
        }
    }

    #[tokio::test]
    async fn visible_upstreams_without_filter_returns_everything() {
        let router = test_router().await;
        let session = router.create_session("s1".to_string(), None, None, PaginationMode::Disabled, SessionContext::default(), 0).await;
        let mut visible = router.visible_upstreams(&session).await.unwrap();
        visible.sort();
        assert_eq!(visible, vec!["internal-tool".to_string(), "weather".to_string()]);
    }

    #[tokio::test]
    async fn visible_upstreams_with_tag_query_filters() {
        let router = test_router().await;
        let query = crate::filter::query::parse_query(&json!({"prod": true})).unwrap();
        let session = router.create_session("s1".to_string(), None, Some(query), PaginationMode::Disabled, SessionContext::default(), 0).await;
        let visible = router.visible_upstreams(&session).await.unwrap();
        assert_eq!(visible, vec!["weather".to_string()]);
    }

    #[tokio::test]
    async fn call_tool_rejects_unnamespaced_name() {
        let router = test_router().await;
        let session = router.create_session("s1".to_string(), None, None, PaginationMode::Disabled, SessionContext::default(), 0).await;
        let result = router.call_tool(&session, json!({"name": "bare-name"})).await;
        assert!(matches!(result, Err(ProxyError::NotFound(_))));
    }

    #[tokio::test]
    async fn call_tool_rejects_not_visible_upstream() {
        let router = test_router().await;
        let query = crate::filter::query::parse_query(&json!({"prod": true})).unwrap();
        let session = router.create_session("s1".to_string(), None, Some(query), PaginationMode::Disabled, SessionContext::default(), 0).await;
        let name = namespace::encode("internal-tool", "do_thing");
        let result = router.call_tool(&session, json!({"name": name})).await;
        assert!(matches!(result, Err(ProxyError::NotVisible(_))));
    }

    #[tokio::test]
    async fn dispatch_rejects_reverse_methods() {
        let router = test_router().await;
        let result = router.dispatch("s1", "sampling/createMessage", json!({}), 0).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn dispatch_initialize_reports_server_info() {
        let router = test_router().await;
        let result = router.dispatch("s1", "initialize", json!({}), 0).await.unwrap();
        assert_eq!(result["serverInfo"]["name"], "aggregator");
    }

    #[tokio::test]
    async fn private_template_instance_is_visible_only_to_its_own_session() {
        let router = test_router().await;
        router.upstreams.set_templates({
            let mut templates = HashMap::new();
            templates.insert(
                "workspace".to_string(),
                crate::config::ServerTemplate { descriptor: descriptor("workspace", &[]), shareable: false },
            );
            templates
        }).await;

        let session_a = router.create_session("a".to_string(), None, None, PaginationMode::Disabled, SessionContext::default(), 0).await;
        let session_b = router.create_session("b".to_string(), None, None, PaginationMode::Disabled, SessionContext::default(), 0).await;

        let visible_a = router.visible_upstreams(&session_a).await.unwrap();
        let visible_b = router.visible_upstreams(&session_b).await.unwrap();

        let a_instance = visible_a.iter().find(|n| n.starts_with("workspace:")).unwrap();
        let b_instance = visible_b.iter().find(|n| n.starts_with("workspace:")).unwrap();
        assert_ne!(a_instance, b_instance);
        assert!(!visible_a.contains(b_instance));
        assert!(!visible_b.contains(a_instance));
    }
}
