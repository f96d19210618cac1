//! Inbound session table: one entry per connected MCP client, tracking its
//! visibility filter and pagination preference so repeated requests on the
//! same `MCP-Session-Id` see a consistent view (spec §4.2, §6).

use crate::config::template::SessionContext;
use crate::filter::{FilterQuery, PresetStore};
use crate::router::pagination::PaginationMode;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// How this session's visible upstream/tool set is determined.
#[derive(Debug, Clone)]
pub enum VisibilityMode {
    /// No filter: every enabled, connected upstream is visible.
    All,
    /// A literal tag query sent on connect (`?tags=` / `?filter=`).
    Query(FilterQuery),
    /// A reference to a named, centrally managed preset (`?preset=`).
    Preset(String),
}

pub struct InboundSession {
    pub id: String,
    pub visibility: VisibilityMode,
    pub pagination_mode: PaginationMode,
    /// Template placeholder values this session connected with (spec §9).
    pub context: SessionContext,
    /// Connection keys of template instances rendered for this session,
    /// populated once at session creation. Not re-derived per request since
    /// a session's rendered upstreams don't change without reconnecting.
    template_upstreams: RwLock<Vec<String>>,
    /// Unix millis of last access, for TTL sweeping. Atomic so reads on the
    /// hot request path don't need to take a lock just to bump this.
    last_accessed_ms: AtomicI64,
}

impl InboundSession {
    pub fn touch(&self, now_ms: i64) {
        self.last_accessed_ms.store(now_ms, Ordering::Relaxed);
    }

    pub fn last_accessed_ms(&self) -> i64 {
        self.last_accessed_ms.load(Ordering::Relaxed)
    }

    pub async fn set_template_upstreams(&self, names: Vec<String>) {
        *self.template_upstreams.write().await = names;
    }

    pub async fn template_upstreams(&self) -> Vec<String> {
        self.template_upstreams.read().await.clone()
    }

    /// Resolve this session's current visibility query, following a preset
    /// reference to the live preset (so preset edits apply retroactively
    /// without the session needing to reconnect).
    pub fn resolve_query(&self, presets: &PresetStore) -> Option<FilterQuery> {
        match &self.visibility {
            VisibilityMode::All => None,
            VisibilityMode::Query(q) => Some(q.clone()),
            VisibilityMode::Preset(name) => presets.get(name).map(|p| FilterQuery::Advanced(p.parsed)),
        }
    }
}

pub struct SessionTable {
    sessions: DashMap<String, Arc<InboundSession>>,
    ttl: Duration,
}

impl SessionTable {
    pub fn new(ttl: Duration) -> Self {
        Self { sessions: DashMap::new(), ttl }
    }

    pub fn create(
        &self,
        id: String,
        visibility: VisibilityMode,
        pagination_mode: PaginationMode,
        context: SessionContext,
        now_ms: i64,
    ) -> Arc<InboundSession> {
        let session = Arc::new(InboundSession {
            id: id.clone(),
            visibility,
            pagination_mode,
            context,
            template_upstreams: RwLock::new(Vec::new()),
            last_accessed_ms: AtomicI64::new(now_ms),
        });
        self.sessions.insert(id, session.clone());
        session
    }

    pub fn get(&self, id: &str, now_ms: i64) -> Option<Arc<InboundSession>> {
        let session = self.sessions.get(id).map(|s| s.clone());
        if let Some(s) = &session {
            s.touch(now_ms);
        }
        session
    }

    pub fn remove(&self, id: &str) {
        self.sessions.remove(id);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop every session whose last access is older than the configured
    /// TTL. Returns the removed session ids (for logging).
    pub fn sweep_expired(&self, now_ms: i64) -> Vec<String> {
        let ttl_ms = self.ttl.as_millis() as i64;
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| now_ms - entry.value().last_accessed_ms() > ttl_ms)
            .map(|entry| entry.key().clone())
            .collect();
        for id in &expired {
            self.sessions.remove(id);
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_get_round_trips() {
        let table = SessionTable::new(Duration::from_secs(3600));
        table.create("s1".to_string(), VisibilityMode::All, PaginationMode::Disabled, SessionContext::default(), 1000);
        let session = table.get("s1", 1001).unwrap();
        assert_eq!(session.id, "s1");
        assert_eq!(session.last_accessed_ms(), 1001);
    }

    #[test]
    fn get_touches_last_accessed() {
        let table = SessionTable::new(Duration::from_secs(3600));
        table.create("s1".to_string(), VisibilityMode::All, PaginationMode::Disabled, SessionContext::default(), 0);
        table.get("s1", 5000);
        assert_eq!(table.get("s1", 5000).unwrap().last_accessed_ms(), 5000);
    }

    #[test]
    fn sweep_expired_removes_stale_sessions_only() {
        let table = SessionTable::new(Duration::from_secs(10));
        table.create("stale".to_string(), VisibilityMode::All, PaginationMode::Disabled, SessionContext::default(), 0);
        table.create("fresh".to_string(), VisibilityMode::All, PaginationMode::Disabled, SessionContext::default(), 100_000);

        let expired = table.sweep_expired(100_000);
        assert_eq!(expired, vec!["stale".to_string()]);
        assert!(table.get("stale", 100_000).is_none());
        assert!(table.get("fresh", 100_000).is_some());
    }

    #[test]
    fn remove_drops_session() {
        let table = SessionTable::new(Duration::from_secs(10));
        table.create("s1".to_string(), VisibilityMode::All, PaginationMode::Disabled, SessionContext::default(), 0);
        table.remove("s1");
        assert!(table.get("s1", 0).is_none());
    }
}
