//! Named, persisted tag filters ("presets"): save a DSL expression under a
//! name, reference it from a session by name instead of resending the
//! expression on every connect (spec §4.5).

use super::dsl::{self, TagExpr};
use crate::error::{ProxyError, ProxyResult};
use dashmap::DashMap;
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub struct Preset {
    pub name: String,
    pub expression: String,
    pub parsed: TagExpr,
}

/// Emitted whenever a preset is created, updated, or removed, so the router
/// can broadcast `notifications/tools/list_changed` (and the resource/prompt
/// equivalents) to every session pinned to that preset (spec §4.5).
#[derive(Debug, Clone)]
pub struct PresetChanged {
    pub name: String,
}

pub struct PresetStore {
    presets: DashMap<String, Preset>,
    changes: broadcast::Sender<PresetChanged>,
}

impl PresetStore {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(64);
        Self { presets: DashMap::new(), changes: tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PresetChanged> {
        self.changes.subscribe()
    }

    pub fn get(&self, name: &str) -> Option<Preset> {
        self.presets.get(name).map(|p| p.clone())
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.presets.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn upsert(&self, name: &str, expression: &str) -> ProxyResult<()> {
        let parsed = dsl::parse(expression).map_err(|e| ProxyError::InvalidFilter(e.to_string()))?;
        self.presets.insert(
            name.to_string(),
            Preset { name: name.to_string(), expression: expression.to_string(), parsed },
        );
        let _ = self.changes.send(PresetChanged { name: name.to_string() });
        Ok(())
    }

    pub fn remove(&self, name: &str) -> ProxyResult<()> {
        self.presets
            .remove(name)
            .ok_or_else(|| ProxyError::PresetNotFound(name.to_string()))?;
        let _ = self.changes.send(PresetChanged { name: name.to_string() });
        Ok(())
    }
}

impl Default for PresetStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn upsert_then_get_round_trips() {
        let store = PresetStore::new();
        store.upsert("prod-only", "prod AND NOT beta").unwrap();
        let preset = store.get("prod-only").unwrap();
        let tags: HashSet<String> = ["prod".to_string()].into_iter().collect();
        assert!(preset.parsed.matches(&tags));
    }

    #[test]
    fn upsert_rejects_invalid_expression() {
        let store = PresetStore::new();
        assert!(store.upsert("bad", "AND prod").is_err());
    }

    #[test]
    fn remove_unknown_preset_errors() {
        let store = PresetStore::new();
        assert!(matches!(store.remove("missing"), Err(ProxyError::PresetNotFound(_))));
    }

    #[tokio::test]
    async fn upsert_broadcasts_preset_changed() {
        let store = PresetStore::new();
        let mut rx = store.subscribe();
        store.upsert("prod-only", "prod").unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.name, "prod-only");
    }
}
