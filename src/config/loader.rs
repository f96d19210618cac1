//! Loads/saves/validates the JSON configuration file.
//!
//! Direct descendant of the teacher's `ConfigManager` (`config.rs`):
//! same read-to-string/`serde_json::from_str`/pretty-print-on-save shape,
//! generalized to the aggregator's `mcpServers` map and extended with the
//! env-substitution pass and per-entry (rather than whole-document)
//! validation spec §4.6 requires.

use super::app::AppConfig;
use super::descriptor::validate_descriptor;
use super::substitute::substitute_json;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub struct ConfigManager {
    config_path: PathBuf,
}

/// Outcome of a single load: the config with invalid entries already
/// dropped, plus the names that were skipped and why (logged by the
/// caller, spec §4.6: "entries failing validation are logged and skipped").
pub struct LoadOutcome {
    pub config: AppConfig,
    pub skipped: Vec<(String, String)>,
}

impl ConfigManager {
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Load config from disk, returning default if the file doesn't exist.
    pub fn load(&self) -> Result<LoadOutcome> {
        if !self.config_path.exists() {
            tracing::info!("config file not found at {:?}, using defaults", self.config_path);
            return Ok(LoadOutcome {
                config: AppConfig::default(),
                skipped: Vec::new(),
            });
        }

        let data = std::fs::read_to_string(&self.config_path).context("failed to read config file")?;
        self.parse(&data)
    }

    /// Parse+validate a config document already read into memory (also used
    /// directly by the watcher, which already has the file bytes).
    pub fn parse(&self, data: &str) -> Result<LoadOutcome> {
        let mut raw: serde_json::Value =
            serde_json::from_str(data).context("failed to parse config file as JSON")?;

        // env substitution is opt-in per the `envSubstitution` flag, but we
        // need to know the flag before deciding whether to substitute — so
        // substitute a clone only when the flag (read from the raw value
        // first) is set.
        let env_sub_enabled = raw
            .get("envSubstitution")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if env_sub_enabled {
            substitute_json(&mut raw);
        }

        let mut config: AppConfig =
            serde_json::from_value(raw).context("config does not match expected schema")?;
        config.env_substitution = env_sub_enabled;

        let mut skipped = Vec::new();
        config.mcp_servers.retain(|name, descriptor| {
            descriptor.name = name.clone();
            match validate_descriptor(descriptor) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("skipping invalid upstream '{}': {}", name, e);
                    skipped.push((name.clone(), e));
                    false
                }
            }
        });
        config.mcp_templates.retain(|name, tmpl| {
            tmpl.descriptor.name = name.clone();
            // Templates may reference placeholders in required fields (e.g.
            // `command` containing `{{project}}`), so only the name itself
            // and transport-kind inference are checked up front; full
            // validation happens after per-session rendering.
            if !super::descriptor::is_valid_upstream_name(name) {
                tracing::warn!("skipping invalid template '{}': bad name", name);
                skipped.push((name.clone(), "invalid name".to_string()));
                return false;
            }
            true
        });

        tracing::info!(
            "loaded config: {} servers, {} templates, {} skipped",
            config.mcp_servers.len(),
            config.mcp_templates.len(),
            skipped.len()
        );

        Ok(LoadOutcome { config, skipped })
    }

    /// Save config to disk.
    pub fn save(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create config directory")?;
        }
        let data = serde_json::to_string_pretty(config).context("failed to serialize config")?;
        std::fs::write(&self.config_path, data).context("failed to write config file")?;
        tracing::info!("saved config to {:?}", self.config_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_default_config() {
        let mgr = ConfigManager::new(PathBuf::from("/nonexistent/path/agg-mcp.json"));
        let outcome = mgr.load().unwrap();
        assert!(outcome.config.mcp_servers.is_empty());
    }

    #[test]
    fn invalid_server_entries_are_skipped_not_fatal() {
        let mgr = ConfigManager::new(PathBuf::from("unused.json"));
        let doc = serde_json::json!({
            "mcpServers": {
                "good": {"type": "stdio", "command": "echo"},
                "bad name": {"type": "stdio", "command": "echo"},
                "no-command": {"type": "stdio"}
            }
        })
        .to_string();
        let outcome = mgr.parse(&doc).unwrap();
        assert_eq!(outcome.config.mcp_servers.len(), 1);
        assert!(outcome.config.mcp_servers.contains_key("good"));
        assert_eq!(outcome.skipped.len(), 2);
    }

    #[test]
    fn env_substitution_only_when_flag_set() {
        std::env::set_var("AGG_MCP_TEST_CMD", "real-command");
        let mgr = ConfigManager::new(PathBuf::from("unused.json"));
        let doc = serde_json::json!({
            "envSubstitution": true,
            "mcpServers": {
                "a": {"type": "stdio", "command": "${AGG_MCP_TEST_CMD}"}
            }
        })
        .to_string();
        let outcome = mgr.parse(&doc).unwrap();
        assert_eq!(
            outcome.config.mcp_servers.get("a").unwrap().command.as_deref(),
            Some("real-command")
        );
    }

    #[test]
    fn round_trips_through_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mgr = ConfigManager::new(path);
        let mut config = AppConfig::default();
        config.proxy_port = 4242;
        mgr.save(&config).unwrap();
        let loaded = mgr.load().unwrap();
        assert_eq!(loaded.config.proxy_port, 4242);
    }
}
