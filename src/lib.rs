//! `agg-mcp`: an aggregating proxy for the Model Context Protocol.
//!
//! Presents many heterogeneous upstream MCP servers — stdio, streamable
//! HTTP, legacy SSE — as one namespaced, tag-filterable, lazily-loaded
//! aggregate. [`Aggregator`] is the root value composed once at startup
//! (spec §9: "singletons -> explicit dependencies") and handed to whichever
//! inbound transport the CLI selected.

pub mod config;
pub mod error;
pub mod filter;
pub mod lazy;
pub mod oauth;
pub mod pidfile;
pub mod router;
pub mod transport_in;
pub mod upstream;

use config::{AppConfig, ConfigWatcher};
use error::ProxyResult;
use filter::PresetStore;
use lazy::{FallbackPolicy, LazyMode, LazyOrchestrator};
use oauth::OAuthProvider;
use router::notify::ListChangedNotifier;
use router::{Router, SessionTable};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use upstream::UpstreamManager;

pub const DEFAULT_AGENT_NAME: &str = "agg-mcp";
const SCHEMA_CACHE_CAPACITY: usize = 2048;
const SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// The fully wired runtime: config watcher, upstream connection manager,
/// inbound router, and the lazy-loading layer in front of it.
pub struct Aggregator {
    pub watcher: Arc<ConfigWatcher>,
    pub upstreams: Arc<UpstreamManager>,
    pub router: Arc<Router>,
    pub lazy: Arc<LazyOrchestrator>,
    pub config_dir: PathBuf,
}

impl Aggregator {
    /// Load config, connect every enabled upstream, and assemble the router
    /// and lazy-loading orchestrator around it. Does not start any inbound
    /// transport or the config watcher's filesystem notifier — call
    /// [`Aggregator::spawn_background_tasks`] for that once the caller is
    /// ready to serve traffic.
    pub async fn bootstrap(config_path: PathBuf, lazy_mode: LazyMode, fallback: FallbackPolicy) -> ProxyResult<Self> {
        let (watcher, initial_config) = ConfigWatcher::new(config_path.clone())
            .map_err(|e| error::ProxyError::Fatal(format!("failed to load config: {}", e)))?;
        let watcher = Arc::new(watcher);

        let config_dir = config_path.parent().map(|p| p.to_path_buf()).unwrap_or_else(|| PathBuf::from("."));

        let oauth_providers = build_oauth_providers(&initial_config);
        let upstreams = Arc::new(UpstreamManager::new(DEFAULT_AGENT_NAME.to_string(), &initial_config, oauth_providers));
        upstreams.connect_all(initial_config.effective_static_servers()).await;

        let router = Arc::new(Router {
            upstreams: upstreams.clone(),
            sessions: Arc::new(SessionTable::new(SESSION_TTL)),
            presets: Arc::new(PresetStore::new()),
            notifier: Arc::new(ListChangedNotifier::new(Duration::from_millis(initial_config.batch_delay_ms))),
            agent_name: DEFAULT_AGENT_NAME.to_string(),
        });

        let cache = Arc::new(lazy::cache::SchemaCache::new(SCHEMA_CACHE_CAPACITY, None));
        let lazy = Arc::new(LazyOrchestrator::new(router.clone(), cache, lazy_mode, fallback));

        Ok(Self { watcher, upstreams, router, lazy, config_dir })
    }

    /// Start the config-file watcher and the upstream health-check loop.
    /// Config changes are applied to the upstream manager as they arrive;
    /// the router always reads upstream state live, so no explicit
    /// propagation into `router` is needed beyond `upstreams.reload`.
    pub fn spawn_background_tasks(&self, health_check_interval_secs: u64) {
        let mut reload_rx = self.watcher.clone().spawn();
        let upstreams = self.upstreams.clone();
        let router = self.router.clone();
        tokio::spawn(async move {
            while let Some(change) = reload_rx.recv().await {
                upstreams.reload(change.current.effective_static_servers()).await;
                upstreams.set_templates(change.current.mcp_templates.clone()).await;
                router.notify_tools_changed();
                router.notify_resources_changed();
                router.notify_prompts_changed();
            }
        });

        upstream::spawn_health_loop(self.upstreams.clone(), health_check_interval_secs);

        let router = self.router.clone();
        let mut preset_rx = self.router.presets.subscribe();
        tokio::spawn(async move {
            while let Ok(change) = preset_rx.recv().await {
                tracing::info!("preset '{}' changed, notifying sessions", change.name);
                router.notify_tools_changed();
                router.notify_resources_changed();
                router.notify_prompts_changed();
            }
        });

        let router = self.router.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(600)).await;
                let now = chrono::Utc::now().timestamp_millis();
                let expired = router.sessions.sweep_expired(now);
                if !expired.is_empty() {
                    tracing::info!("swept {} expired session(s)", expired.len());
                }
            }
        });
    }

    pub async fn shutdown(&self) {
        self.upstreams.shutdown().await;
    }
}

/// Build the upstream-name -> OAuth-provider map from config. Every
/// descriptor naming an `oauthProvider` gets a [`oauth::StaticTokenProvider`]
/// seeded from `AGG_MCP_OAUTH_TOKEN_<UPSTREAM_NAME>` (uppercased, `-` -> `_`),
/// wrapped in [`oauth::CoalescingRefresh`] so concurrent 401s on the same
/// upstream share one refresh. No token in the environment means calls to
/// that upstream fail `AuthFailed` rather than silently going unauthenticated.
fn build_oauth_providers(config: &AppConfig) -> HashMap<String, Arc<dyn OAuthProvider>> {
    let mut providers: HashMap<String, Arc<dyn OAuthProvider>> = HashMap::new();
    let named_descriptors = config
        .mcp_servers
        .iter()
        .chain(config.mcp_templates.iter().map(|(name, tmpl)| (name, &tmpl.descriptor)));
    for (name, descriptor) in named_descriptors {
        if descriptor.oauth_provider.is_none() {
            continue;
        }
        let provider = oauth::StaticTokenProvider::new();
        let env_key = format!("AGG_MCP_OAUTH_TOKEN_{}", name.to_uppercase().replace('-', "_"));
        if let Ok(token) = std::env::var(&env_key) {
            provider.set(name, token);
        }
        providers.insert(name.clone(), Arc::new(oauth::CoalescingRefresh::new(provider)));
    }
    providers
}
