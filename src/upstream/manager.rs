//! Owns every upstream connection, applies config diffs, and runs the
//! health-check/reconnect loop.
//!
//! Generalizes the teacher's `McpManager` (`mcp/manager.rs`) from a flat
//! `Vec<McpServerConfig>` CRUD surface into diff-driven reload: config
//! changes arrive as a whole new map (from [`crate::config::ConfigWatcher`])
//! and are reconciled against the live connection set by
//! [`crate::config::diff_descriptors`] rather than one-at-a-time commands.

use crate::config::template::{connection_key, render_descriptor, SessionContext};
use crate::config::{diff_descriptors, AppConfig, ServerTemplate, UpstreamDescriptor};
use crate::error::{ProxyError, ProxyResult};
use crate::oauth::OAuthProvider;
use crate::router::reverse::ReverseHub;
use crate::upstream::connection::{ConnectionState, UpstreamConnection};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

pub struct UpstreamManager {
    agent_name: String,
    connections: RwLock<HashMap<String, Arc<UpstreamConnection>>>,
    descriptors: RwLock<HashMap<String, UpstreamDescriptor>>,
    templates: RwLock<HashMap<String, ServerTemplate>>,
    /// Connection keys that came from rendering a template rather than a
    /// static descriptor. Excluded from the ordinary tag-filtered scan in
    /// [`crate::router::Router::visible_upstreams`] — a rendered instance is
    /// only visible to the session(s) that instantiated it.
    template_instances: RwLock<HashSet<String>>,
    graceful_close_timeout: Duration,
    max_reconnect_attempts: u32,
    auto_reconnect: bool,
    oauth_providers: HashMap<String, Arc<dyn OAuthProvider>>,
    /// Serializes reload() calls so a config-file reload racing a
    /// preset-triggered reload never interleaves (spec §9 open question).
    reload_guard: Mutex<()>,
    /// Shared with every [`UpstreamConnection`] this manager creates, and
    /// with the inbound transports, so server-initiated requests from any
    /// upstream can be forwarded to whichever inbound session can answer.
    pub reverse: Arc<ReverseHub>,
}

impl UpstreamManager {
    pub fn new(agent_name: String, config: &AppConfig, oauth_providers: HashMap<String, Arc<dyn OAuthProvider>>) -> Self {
        Self {
            agent_name,
            connections: RwLock::new(HashMap::new()),
            descriptors: RwLock::new(HashMap::new()),
            templates: RwLock::new(config.mcp_templates.clone()),
            template_instances: RwLock::new(HashSet::new()),
            graceful_close_timeout: Duration::from_millis(config.graceful_close_timeout_ms),
            max_reconnect_attempts: config.max_reconnect_attempts,
            auto_reconnect: config.auto_reconnect,
            oauth_providers,
            reload_guard: Mutex::new(()),
            reverse: Arc::new(ReverseHub::new()),
        }
    }

    /// Replace the set of known templates (spec §4.6 config reload). Already
    /// instantiated template connections are left alone; they're keyed by
    /// render hash or session id, not by template name, so a template
    /// definition change only affects instances created from then on.
    pub async fn set_templates(&self, templates: HashMap<String, ServerTemplate>) {
        *self.templates.write().await = templates;
    }

    pub async fn template_names(&self) -> Vec<String> {
        self.templates.read().await.keys().cloned().collect()
    }

    pub async fn is_template_instance(&self, name: &str) -> bool {
        self.template_instances.read().await.contains(name)
    }

    /// Render `template_name` against `context` and ensure a connection
    /// exists for the result, creating and connecting one if this is the
    /// first session to need it (spec §9: template rendering vs. shared
    /// connections). Returns the connection key to route through.
    pub async fn ensure_template(&self, template_name: &str, session_id: &str, context: &SessionContext) -> ProxyResult<String> {
        let template = self
            .templates
            .read()
            .await
            .get(template_name)
            .cloned()
            .ok_or_else(|| ProxyError::NotFound(format!("template '{}'", template_name)))?;

        let mut rendered = render_descriptor(&template, context);
        let key = connection_key(template_name, &template, &rendered, session_id);
        rendered.name = key.clone();

        if self.connections.read().await.contains_key(&key) {
            return Ok(key);
        }

        let conn = Arc::new(UpstreamConnection::new(
            rendered.clone(),
            self.agent_name.clone(),
            self.oauth_providers.get(template_name).cloned(),
            self.reverse.clone(),
        ));
        if rendered.disabled {
            conn.mark_disabled().await;
        } else if let Err(e) = conn.connect().await {
            tracing::warn!("template '{}' instance '{}' failed to connect: {}", template_name, key, e);
        }

        self.template_instances.write().await.insert(key.clone());
        self.connections.write().await.insert(key.clone(), conn);
        Ok(key)
    }

    /// Connect every upstream in `descriptors` in parallel. Disabled
    /// descriptors get a `Disabled` entry instead of a transport attempt;
    /// connect failures are logged and leave that upstream in `Error` state
    /// rather than aborting startup — an aggregator with 9 of 10 upstreams
    /// up is still useful. Either way every descriptor ends up with an
    /// entry in the connection map.
    pub async fn connect_all(&self, descriptors: HashMap<String, UpstreamDescriptor>) {
        let pending: Vec<_> = descriptors
            .iter()
            .map(|(name, descriptor)| {
                let conn = Arc::new(UpstreamConnection::new(
                    descriptor.clone(),
                    self.agent_name.clone(),
                    self.oauth_providers.get(name).cloned(),
                    self.reverse.clone(),
                ));
                let name = name.clone();
                let disabled = descriptor.disabled;
                async move {
                    if disabled {
                        tracing::info!("upstream '{}' is disabled", name);
                        conn.mark_disabled().await;
                    } else if let Err(e) = conn.connect().await {
                        tracing::warn!("upstream '{}' failed initial connect: {}", name, e);
                    }
                    (name, conn)
                }
            })
            .collect();

        let connected = futures::future::join_all(pending).await;

        let mut conns = self.connections.write().await;
        for (name, conn) in connected {
            conns.insert(name, conn);
        }
        drop(conns);
        *self.descriptors.write().await = descriptors;
    }

    pub async fn get(&self, name: &str) -> Option<Arc<UpstreamConnection>> {
        self.connections.read().await.get(name).cloned()
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connections.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn all(&self) -> Vec<Arc<UpstreamConnection>> {
        self.connections.read().await.values().cloned().collect()
    }

    /// Forward one JSON-RPC call to `upstream_name` with an effective
    /// deadline (spec §4.1: `invoke(name, method, params, deadline)`). A
    /// `deadline_ms` of `None` falls back to the upstream's configured
    /// `requestTimeout ?? timeout ?? no timeout`.
    pub async fn invoke(&self, upstream_name: &str, method: &str, params: serde_json::Value, deadline_ms: Option<u64>) -> ProxyResult<serde_json::Value> {
        let conn = self
            .get(upstream_name)
            .await
            .ok_or_else(|| ProxyError::NotFound(upstream_name.to_string()))?;

        let deadline_ms = deadline_ms.or_else(|| conn.descriptor.effective_request_timeout_ms());

        match deadline_ms {
            None => conn.execute_request(method, params).await,
            Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), conn.execute_request(method, params)).await {
                Ok(result) => result,
                Err(_) => Err(ProxyError::Timeout {
                    upstream: upstream_name.to_string(),
                    deadline_ms: ms,
                }),
            },
        }
    }

    /// Reconcile the live connection set with a freshly loaded descriptor
    /// map: added upstreams are connected, removed ones are gracefully
    /// closed and dropped, and modified ones are either hot-patched (if
    /// only metadata changed) or torn down and reconnected (if transport
    /// fields changed) — spec §4.6.
    pub async fn reload(&self, new_descriptors: HashMap<String, UpstreamDescriptor>) {
        let _guard = self.reload_guard.lock().await;

        let old_descriptors = self.descriptors.read().await.clone();
        let diff = diff_descriptors(&old_descriptors, &new_descriptors);

        if diff.added.is_empty() && diff.removed.is_empty() && diff.modified.is_empty() {
            tracing::debug!("config reload: no changes to upstream set");
            return;
        }

        tracing::info!(
            "config reload: {} added, {} removed, {} modified",
            diff.added.len(),
            diff.removed.len(),
            diff.modified.len()
        );

        let mut conns = self.connections.write().await;

        for name in &diff.removed {
            if let Some(conn) = conns.remove(name) {
                conn.disconnect_graceful(self.graceful_close_timeout).await;
            }
        }

        let pending: Vec<_> = diff
            .added
            .iter()
            .map(|name| {
                let descriptor = new_descriptors[name].clone();
                let disabled = descriptor.disabled;
                let conn = Arc::new(UpstreamConnection::new(
                    descriptor,
                    self.agent_name.clone(),
                    self.oauth_providers.get(name).cloned(),
                    self.reverse.clone(),
                ));
                let name = name.clone();
                async move {
                    if disabled {
                        tracing::info!("upstream '{}' is disabled", name);
                        conn.mark_disabled().await;
                    } else if let Err(e) = conn.connect().await {
                        tracing::warn!("upstream '{}' failed to connect: {}", name, e);
                    }
                    (name, conn)
                }
            })
            .collect();
        for (name, conn) in futures::future::join_all(pending).await {
            conns.insert(name, conn);
        }

        for modified in &diff.modified {
            let descriptor = new_descriptors[&modified.name].clone();
            if modified.transport_affecting {
                if let Some(old_conn) = conns.remove(&modified.name) {
                    old_conn.disconnect_graceful(self.graceful_close_timeout).await;
                }
                let conn = Arc::new(UpstreamConnection::new(
                    descriptor.clone(),
                    self.agent_name.clone(),
                    self.oauth_providers.get(&modified.name).cloned(),
                    self.reverse.clone(),
                ));
                if descriptor.disabled {
                    conn.mark_disabled().await;
                } else if let Err(e) = conn.connect().await {
                    tracing::warn!("upstream '{}' failed to reconnect after config change: {}", modified.name, e);
                }
                conns.insert(modified.name.clone(), conn);
            } else {
                tracing::debug!("upstream '{}': cosmetic-only change ({:?}), no reconnect", modified.name, modified.fields_changed);
            }
        }

        drop(conns);
        *self.descriptors.write().await = new_descriptors;
    }

    /// One health-check pass: ping connected upstreams, attempt reconnect on
    /// disconnected/errored ones under `max_reconnect_attempts` (spec §4.1).
    pub async fn health_check_cycle(&self) {
        let conns: Vec<Arc<UpstreamConnection>> = self.connections.read().await.values().cloned().collect();
        for conn in conns {
            match conn.state().await {
                ConnectionState::Connected => {
                    if let Err(e) = conn.ping().await {
                        tracing::warn!("upstream '{}' ping failed: {}", conn.name(), e);
                    }
                }
                ConnectionState::Error | ConnectionState::Disconnected => {
                    if !self.auto_reconnect || conn.descriptor.disabled {
                        continue;
                    }
                    let attempts = conn.reconnect_attempts().await;
                    if attempts < self.max_reconnect_attempts {
                        tracing::info!(
                            "upstream '{}': reconnect attempt {} of {}",
                            conn.name(),
                            attempts + 1,
                            self.max_reconnect_attempts
                        );
                        conn.bump_reconnect_attempts().await;
                        if let Err(e) = conn.connect().await {
                            tracing::warn!("upstream '{}' reconnect failed: {}", conn.name(), e);
                        }
                    }
                }
                ConnectionState::Connecting => {}
                ConnectionState::Disabled => {}
            }
        }
    }

    pub async fn shutdown(&self) {
        let conns = self.connections.read().await;
        for conn in conns.values() {
            conn.disconnect_graceful(self.graceful_close_timeout).await;
        }
        tracing::info!("all upstream connections shut down");
    }
}

/// Background health-check loop, spawned once at startup.
pub fn spawn_health_loop(manager: Arc<UpstreamManager>, interval_secs: u64) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(interval_secs)).await;
            manager.health_check_cycle().await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportKind;

    fn descriptor(name: &str) -> UpstreamDescriptor {
        UpstreamDescriptor {
            name: name.to_string(),
            transport_type: Some(TransportKind::Stdio),
            command: Some("nonexistent-binary-for-tests".into()),
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

    #[tokio::test]
    async fn connect_all_registers_descriptors_even_on_connect_failure() {
        let config = AppConfig::default();
        let manager = UpstreamManager::new("test-agent".into(), &config, HashMap::new());
        let mut descriptors = HashMap::new();
        descriptors.insert("a".to_string(), descriptor("a"));
        manager.connect_all(descriptors).await;
        assert_eq!(manager.names().await, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn invoke_unknown_upstream_is_not_found() {
        let config = AppConfig::default();
        let manager = UpstreamManager::new("test-agent".into(), &config, HashMap::new());
        let result = manager.invoke("missing", "tools/list", serde_json::json!({}), None).await;
        assert!(matches!(result, Err(ProxyError::NotFound(_))));
    }

    #[tokio::test]
    async fn reload_adds_and_removes_upstreams() {
        let config = AppConfig::default();
        let manager = UpstreamManager::new("test-agent".into(), &config, HashMap::new());
        let mut initial = HashMap::new();
        initial.insert("a".to_string(), descriptor("a"));
        manager.connect_all(initial).await;

        let mut next = HashMap::new();
        next.insert("b".to_string(), descriptor("b"));
        manager.reload(next).await;

        let names = manager.names().await;
        assert_eq!(names, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn reload_is_noop_when_nothing_changed() {
        let config = AppConfig::default();
        let manager = UpstreamManager::new("test-agent".into(), &config, HashMap::new());
        let mut descriptors = HashMap::new();
        descriptors.insert("a".to_string(), descriptor("a"));
        manager.connect_all(descriptors.clone()).await;
        manager.reload(descriptors).await;
        assert_eq!(manager.names().await, vec!["a".to_string()]);
    }

    fn template(name: &str, shareable: bool) -> ServerTemplate {
        ServerTemplate { descriptor: descriptor(name), shareable }
    }

    #[tokio::test]
    async fn ensure_template_instantiates_a_connection_marked_as_a_template_instance() {
        let mut config = AppConfig::default();
        config.mcp_templates.insert("workspace".into(), template("workspace", true));
        let manager = UpstreamManager::new("test-agent".into(), &config, HashMap::new());

        let ctx = SessionContext { project: Some("acme".into()), ..Default::default() };
        let key = manager.ensure_template("workspace", "session-1", &ctx).await.unwrap();

        assert!(manager.is_template_instance(&key).await);
        assert!(manager.get(&key).await.is_some());
    }

    #[tokio::test]
    async fn shareable_template_reuses_the_same_connection_across_sessions() {
        let mut config = AppConfig::default();
        config.mcp_templates.insert("workspace".into(), template("workspace", true));
        let manager = UpstreamManager::new("test-agent".into(), &config, HashMap::new());

        let ctx = SessionContext { project: Some("acme".into()), ..Default::default() };
        let key_a = manager.ensure_template("workspace", "session-a", &ctx).await.unwrap();
        let key_b = manager.ensure_template("workspace", "session-b", &ctx).await.unwrap();
        assert_eq!(key_a, key_b);
    }

    #[tokio::test]
    async fn private_template_gets_a_distinct_connection_per_session() {
        let mut config = AppConfig::default();
        config.mcp_templates.insert("workspace".into(), template("workspace", false));
        let manager = UpstreamManager::new("test-agent".into(), &config, HashMap::new());

        let ctx = SessionContext::default();
        let key_a = manager.ensure_template("workspace", "session-a", &ctx).await.unwrap();
        let key_b = manager.ensure_template("workspace", "session-b", &ctx).await.unwrap();
        assert_ne!(key_a, key_b);
    }

    #[tokio::test]
    async fn ensure_template_unknown_name_is_not_found() {
        let config = AppConfig::default();
        let manager = UpstreamManager::new("test-agent".into(), &config, HashMap::new());
        let result = manager.ensure_template("missing", "session-1", &SessionContext::default()).await;
        assert!(matches!(result, Err(ProxyError::NotFound(_))));
    }
}
