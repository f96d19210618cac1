//! Lazy tool-schema loading (spec §4.4): in `full` mode, `tools/list`
//! behaves exactly like the plain router (every tool with its full input
//! schema, eagerly fetched from upstreams). In `metatool` mode, real tools
//! are hidden entirely behind three synthetic `meta_*` tools so that a
//! client with a small context budget only pays for schemas it actually
//! asks for. `hybrid` lists real tools with their schemas stripped, and
//! pairs them with the same meta tools to fetch schemas on demand.

pub mod cache;
pub mod metatools;

use crate::error::{ProxyError, ProxyResult};
use crate::router::{InboundSession, Router};
use cache::SchemaCache;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LazyMode {
    Full,
    Metatool,
    Hybrid,
}

/// What to do when an upstream tool's schema can't be resolved lazily
/// (the upstream round-trip to fetch it on demand fails).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Drop the tool from the listing / fail the schema request.
    Skip,
    /// Fall back to whatever schema the original bulk `tools/list` call
    /// already returned, even though it wasn't asked for.
    Full,
}

pub struct LazyOrchestrator {
    router: Arc<Router>,
    cache: Arc<SchemaCache>,
    mode: LazyMode,
    fallback: FallbackPolicy,
}

impl LazyOrchestrator {
    pub fn new(router: Arc<Router>, cache: Arc<SchemaCache>, mode: LazyMode, fallback: FallbackPolicy) -> Self {
        Self { router, cache, mode, fallback }
    }

    pub fn mode(&self) -> LazyMode {
        self.mode
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Entry point mirroring `Router::dispatch`, but intercepting the two
    /// methods whose shape depends on the lazy-loading mode.
    pub async fn dispatch(&self, session_id: &str, method: &str, params: Value, now_ms: i64) -> ProxyResult<Value> {
        match method {
            "tools/list" if self.mode != LazyMode::Full => {
                let session = self.router.sessions.get(session_id, now_ms).ok_or_else(|| ProxyError::NotFound(format!("session '{}' not found", session_id)))?;
                self.list_tools(&session, params).await
            }
            "tools/call" if self.mode != LazyMode::Full => {
                let session = self.router.sessions.get(session_id, now_ms).ok_or_else(|| ProxyError::NotFound(format!("session '{}' not found", session_id)))?;
                self.call_tool(&session, params).await
            }
            _ => self.router.dispatch(session_id, method, params, now_ms).await,
        }
    }

    async fn list_tools(&self, session: &InboundSession, params: Value) -> ProxyResult<Value> {
        let real = self.router.list_tools(session, params).await?;
        let mut tools = real.get("tools").and_then(|v| v.as_array()).cloned().unwrap_or_default();

        match self.mode {
            LazyMode::Full => unreachable!("caller already filtered LazyMode::Full out"),
            LazyMode::Metatool => {
                let mut response = json!({ "tools": metatools::definitions() });
                if let Some(next) = real.get("nextCursor") {
                    response["nextCursor"] = next.clone();
                }
                Ok(response)
            }
            LazyMode::Hybrid => {
                for tool in tools.iter_mut() {
                    if let Some(obj) = tool.as_object_mut() {
                        obj.remove("inputSchema");
                    }
                }
                tools.extend(metatools::definitions());
                let mut response = json!({ "tools": tools });
                if let Some(next) = real.get("nextCursor") {
                    response["nextCursor"] = next.clone();
                }
                Ok(response)
            }
        }
    }

    async fn call_tool(&self, session: &InboundSession, params: Value) -> ProxyResult<Value> {
        let name = params.get("name").and_then(|v| v.as_str()).ok_or_else(|| ProxyError::InvalidParams("tools/call requires a 'name'".to_string()))?;

        if !metatools::is_meta_tool(name) {
            // Hybrid mode still allows calling a real namespaced tool directly.
            return self.router.call_tool(session, params).await;
        }

        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

        match name {
            metatools::LIST_TOOLS => self.meta_list_tools(session).await,
            metatools::TOOL_SCHEMA => self.meta_tool_schema(session, &arguments).await,
            metatools::TOOL_INVOKE => self.meta_tool_invoke(session, &arguments).await,
            _ => unreachable!("is_meta_tool guarded this"),
        }
    }

    async fn meta_list_tools(&self, session: &InboundSession) -> ProxyResult<Value> {
        let real = self.router.list_tools(session, json!({})).await?;
        let tools = real.get("tools").and_then(|v| v.as_array()).cloned().unwrap_or_default();
        let stripped: Vec<Value> = tools
            .into_iter()
            .map(|mut t| {
                if let Some(obj) = t.as_object_mut() {
                    obj.remove("inputSchema");
                }
                t
            })
            .collect();
        Ok(json!({ "content": [{ "type": "text", "text": serde_json::to_string(&json!({ "tools": stripped })).unwrap_or_default() }] }))
    }

    async fn meta_tool_schema(&self, session: &InboundSession, arguments: &Value) -> ProxyResult<Value> {
        let namespaced = arguments.get("name").and_then(|v| v.as_str()).ok_or_else(|| ProxyError::InvalidParams("tool_schema requires a 'name'".to_string()))?;
        let (upstream, original) = crate::router::namespace::decode(namespaced).ok_or_else(|| ProxyError::NotFound(format!("unknown tool '{}'", namespaced)))?;

        let visible = self.router.visible_upstreams(session).await?;
        if !visible.iter().any(|u| u == upstream) {
            return Err(ProxyError::NotVisible(upstream.to_string()));
        }

        let router = &self.router;
        let upstream_owned = upstream.to_string();
        let original_owned = original.to_string();
        let schema = self
            .cache
            .get_or_fetch(upstream, original, || async move {
                let result = router.upstreams.invoke(&upstream_owned, "tools/list", json!({}), None).await?;
                let tools = result.get("tools").and_then(|v| v.as_array()).cloned().unwrap_or_default();
                tools
                    .into_iter()
                    .find(|t| t.get("name").and_then(|v| v.as_str()) == Some(original_owned.as_str()))
                    .and_then(|t| t.get("inputSchema").cloned())
                    .ok_or_else(|| ProxyError::NotFound(format!("tool '{}' not found on upstream", original_owned)))
            })
            .await;

        match schema {
            Ok(schema) => Ok(json!({ "content": [{ "type": "text", "text": schema.to_string() }] })),
            Err(e) if self.fallback == FallbackPolicy::Full => {
                // The targeted schema lookup failed (e.g. the upstream doesn't
                // support being asked for one tool) - fall back to asking for
                // everything and picking the one we wanted out of the bulk.
                let result = self.router.upstreams.invoke(upstream, "tools/list", json!({}), None).await?;
                let tools = result.get("tools").and_then(|v| v.as_array()).cloned().unwrap_or_default();
                tools
                    .into_iter()
                    .find(|t| t.get("name").and_then(|v| v.as_str()) == Some(original))
                    .and_then(|t| t.get("inputSchema").cloned())
                    .map(|s| json!({ "content": [{ "type": "text", "text": s.to_string() }] }))
                    .ok_or(e)
            }
            Err(e) => Err(e),
        }
    }

    async fn meta_tool_invoke(&self, session: &InboundSession, arguments: &Value) -> ProxyResult<Value> {
        let name = arguments.get("name").and_then(|v| v.as_str()).ok_or_else(|| ProxyError::InvalidParams("tool_invoke requires a 'name'".to_string()))?;
        let tool_arguments = arguments.get("arguments").cloned().unwrap_or_else(|| json!({}));
        self.router.call_tool(session, json!({ "name": name, "arguments": tool_arguments })).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, TransportKind, UpstreamDescriptor};
    use crate::filter::PresetStore;
    use crate::router::notify::ListChangedNotifier;
    use crate::router::pagination::PaginationMode;
    use crate::router::session::SessionTable;
    use crate::upstream::UpstreamManager;
    use std::collections::HashMap;
    use std::time::Duration;

    fn descriptor(name: &str) -> UpstreamDescriptor {
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
            tags: Vec::new(),
            disabled: false,
            timeout_ms: None,
            connection_timeout_ms: None,
            request_timeout_ms: None,
        }
    }

    async fn test_orchestrator(mode: LazyMode) -> (LazyOrchestrator, Arc<Router>) {
        let config = AppConfig::default();
        let upstreams = Arc::new(UpstreamManager::new("aggregator".to_string(), &config, HashMap::new()));
        let mut descriptors = HashMap::new();
        descriptors.insert("weather".to_string(), descriptor("weather"));
        upstreams.connect_all(descriptors).await;

        let router = Arc::new(Router {
            upstreams,
            sessions: Arc::new(SessionTable::new(Duration::from_secs(3600))),
            presets: Arc::new(PresetStore::new()),
            notifier: Arc::new(ListChangedNotifier::new(Duration::from_millis(50))),
            agent_name: "aggregator".to_string(),
        });
        let cache = Arc::new(SchemaCache::new(32, None));
        let orchestrator = LazyOrchestrator::new(router.clone(), cache, mode, FallbackPolicy::Skip);
        (orchestrator, router)
    }

    #[tokio::test]
    async fn metatool_mode_hides_real_tools_behind_meta_tools() {
        let (orchestrator, router) = test_orchestrator(LazyMode::Metatool).await;
        let session = router.create_session("s1".to_string(), None, None, PaginationMode::Disabled, crate::config::template::SessionContext::default(), 0).await;
        let result = orchestrator.list_tools(&session, json!({})).await.unwrap();
        let names: Vec<&str> = result["tools"].as_array().unwrap().iter().filter_map(|t| t["name"].as_str()).collect();
        assert_eq!(names, vec![metatools::LIST_TOOLS, metatools::TOOL_SCHEMA, metatools::TOOL_INVOKE]);
    }

    #[tokio::test]
    async fn hybrid_mode_strips_schemas_but_keeps_real_names() {
        let (orchestrator, router) = test_orchestrator(LazyMode::Hybrid).await;
        let session = router.create_session("s1".to_string(), None, None, PaginationMode::Disabled, crate::config::template::SessionContext::default(), 0).await;
        let result = orchestrator.list_tools(&session, json!({})).await.unwrap();
        let tools = result["tools"].as_array().unwrap();
        assert!(tools.iter().any(|t| t["name"] == metatools::LIST_TOOLS));
        for tool in tools {
            assert!(tool.get("inputSchema").is_none() || tool["name"].as_str().map(metatools::is_meta_tool).unwrap_or(false));
        }
    }

    #[tokio::test]
    async fn call_tool_rejects_unknown_meta_schema_request() {
        let (orchestrator, router) = test_orchestrator(LazyMode::Metatool).await;
        let session = router.create_session("s1".to_string(), None, None, PaginationMode::Disabled, crate::config::template::SessionContext::default(), 0).await;
        let result = orchestrator
            .call_tool(&session, json!({ "name": metatools::TOOL_SCHEMA, "arguments": { "name": "bogus" } }))
            .await;
        assert!(result.is_err());
    }
}
