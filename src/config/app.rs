//! Top-level application configuration (spec §6): `mcpServers` map plus
//! optional `mcpTemplates`, and the ambient proxy-level settings the
//! teacher's `AppConfig` carried (`proxy_port`, reconnect policy, ...).

use super::descriptor::UpstreamDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A template server: like [`UpstreamDescriptor`] but its string fields may
/// contain `{{project}}`/`{{user}}`/`{{environment}}` placeholders rendered
/// per-session (spec §9, template rendering vs. shared connections).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerTemplate {
    #[serde(flatten)]
    pub descriptor: UpstreamDescriptor,
    /// Whether identical renders across sessions may share one upstream
    /// instance (connection key `name:<hash>`) or must each get a private
    /// instance (connection key `name:<session-id>`).
    #[serde(default)]
    pub shareable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_proxy_port")]
    pub proxy_port: u16,
    #[serde(default = "default_health_interval")]
    pub health_check_interval_secs: u64,
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,
    #[serde(default = "default_max_reconnect")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,
    #[serde(default = "default_graceful_close_timeout")]
    pub graceful_close_timeout_ms: u64,
    #[serde(default)]
    pub env_substitution: bool,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,

    #[serde(default, rename = "mcpServers")]
    pub mcp_servers: HashMap<String, UpstreamDescriptor>,
    #[serde(default, rename = "mcpTemplates")]
    pub mcp_templates: HashMap<String, ServerTemplate>,

    #[serde(default, rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_proxy_port() -> u16 {
    3051
}

fn default_health_interval() -> u64 {
    30
}

fn default_max_reconnect() -> u32 {
    5
}

fn default_connection_timeout() -> u64 {
    30
}

fn default_graceful_close_timeout() -> u64 {
    5000
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_batch_delay_ms() -> u64 {
    50
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            proxy_port: default_proxy_port(),
            health_check_interval_secs: default_health_interval(),
            auto_reconnect: true,
            max_reconnect_attempts: default_max_reconnect(),
            connection_timeout_secs: default_connection_timeout(),
            graceful_close_timeout_ms: default_graceful_close_timeout(),
            env_substitution: false,
            debounce_ms: default_debounce_ms(),
            batch_delay_ms: default_batch_delay_ms(),
            mcp_servers: HashMap::new(),
            mcp_templates: HashMap::new(),
            schema: None,
        }
    }
}

impl AppConfig {
    /// Named, non-disabled upstream descriptors. Template servers whose name
    /// collides with a static server: the static entry loses (spec §4.6).
    pub fn effective_static_servers(&self) -> HashMap<String, UpstreamDescriptor> {
        let mut out = self.mcp_servers.clone();
        for (name, tmpl) in &self.mcp_templates {
            if out.remove(name).is_some() {
                tracing::warn!(
                    "server '{}' is defined both as a static server and a template; \
                     the static entry is dropped",
                    name
                );
            }
            let _ = tmpl; // static (unrendered) view only lists the name collision
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_servers() {
        let c = AppConfig::default();
        assert!(c.mcp_servers.is_empty());
        assert!(c.mcp_templates.is_empty());
    }

    #[test]
    fn template_name_collision_drops_static_entry() {
        use crate::config::descriptor::TransportKind;
        let mut c = AppConfig::default();
        let d = UpstreamDescriptor {
            name: "alpha".into(),
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
        };
        c.mcp_servers.insert("alpha".into(), d.clone());
        c.mcp_templates.insert(
            "alpha".into(),
            ServerTemplate {
                descriptor: d,
                shareable: true,
            },
        );
        let effective = c.effective_static_servers();
        assert!(!effective.contains_key("alpha"));
    }
}
