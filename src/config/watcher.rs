//! Configuration file watcher (spec §4.6).
//!
//! State machine: Idle → Watching → {Reloading → Watching | Error → Watching}.
//! No teacher counterpart (the desktop app only reloads on explicit command);
//! built from the pack convention of `notify` + `notify-debouncer-full` for
//! debounced mtime-change detection (`Mootikins-crucible`, `doublegate-Only1MCP`).

use super::app::AppConfig;
use super::loader::ConfigManager;
use notify_debouncer_full::{new_debouncer, DebounceEventResult};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    Watching,
    Reloading,
    Error,
}

/// Emitted once per successfully validated config change (spec §4.6:
/// "The watcher emits a single `TransportConfigChanged` event").
#[derive(Debug, Clone)]
pub struct TransportConfigChanged {
    pub previous: AppConfig,
    pub current: AppConfig,
}

pub struct ConfigWatcher {
    manager: Arc<ConfigManager>,
    state: Arc<Mutex<WatcherState>>,
    current: Arc<Mutex<AppConfig>>,
}

impl ConfigWatcher {
    /// Load the initial config and prepare a watcher over its file.
    pub fn new(path: PathBuf) -> anyhow::Result<(Self, AppConfig)> {
        let manager = Arc::new(ConfigManager::new(path));
        let outcome = manager.load()?;
        let watcher = Self {
            manager,
            state: Arc::new(Mutex::new(WatcherState::Idle)),
            current: Arc::new(Mutex::new(outcome.config.clone())),
        };
        Ok((watcher, outcome.config))
    }

    pub async fn state(&self) -> WatcherState {
        *self.state.lock().await
    }

    pub async fn current(&self) -> AppConfig {
        self.current.lock().await.clone()
    }

    /// Start watching the config file, emitting [`TransportConfigChanged`]
    /// events on a channel. The debounce window comes from the currently
    /// loaded config's `debounce_ms` (captured at start; changing it requires
    /// a process restart — a reasonable limitation since the watcher's own
    /// cadence can't self-modify safely mid-flight).
    pub fn spawn(self: Arc<Self>) -> mpsc::Receiver<TransportConfigChanged> {
        let (tx, rx) = mpsc::channel(16);
        let debounce_ms = {
            // best-effort synchronous read of the already-loaded config;
            // `current` is populated in `new` before `spawn` is ever called.
            futures::executor::block_on(self.current.lock()).debounce_ms
        };

        let path = self.manager.path().to_path_buf();
        let watcher_for_task = Arc::clone(&self);

        tokio::spawn(async move {
            let (notify_tx, mut notify_rx) = mpsc::channel::<()>(16);
            let mut debouncer = match new_debouncer(
                Duration::from_millis(debounce_ms.max(1)),
                None,
                move |result: DebounceEventResult| {
                    if result.is_ok() {
                        let _ = notify_tx.blocking_send(());
                    }
                },
            ) {
                Ok(d) => d,
                Err(e) => {
                    tracing::error!("failed to start config file watcher: {}", e);
                    return;
                }
            };

            let watch_dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            if let Err(e) = debouncer.watch(watch_dir, notify::RecursiveMode::NonRecursive) {
                tracing::error!("failed to watch config directory {:?}: {}", watch_dir, e);
                return;
            }

            *watcher_for_task.state.lock().await = WatcherState::Watching;

            while notify_rx.recv().await.is_some() {
                watcher_for_task.clone().handle_change(&tx).await;
            }
        });

        rx
    }

    async fn handle_change(self: Arc<Self>, tx: &mpsc::Sender<TransportConfigChanged>) {
        *self.state.lock().await = WatcherState::Reloading;

        match self.manager.load() {
            Ok(outcome) => {
                let previous = self.current.lock().await.clone();
                *self.current.lock().await = outcome.config.clone();
                *self.state.lock().await = WatcherState::Watching;

                let _ = tx
                    .send(TransportConfigChanged {
                        previous,
                        current: outcome.config,
                    })
                    .await;
            }
            Err(e) => {
                tracing::error!("config reload failed, keeping previous config active: {}", e);
                *self.state.lock().await = WatcherState::Error;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_loads_default_when_file_missing() {
        let (_watcher, config) = ConfigWatcher::new(PathBuf::from("/nonexistent/agg-mcp.json")).unwrap();
        assert!(config.mcp_servers.is_empty());
    }

    #[tokio::test]
    async fn handle_change_keeps_previous_config_on_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{}").unwrap();

        let (watcher, _initial) = ConfigWatcher::new(path.clone()).unwrap();
        let watcher = Arc::new(watcher);
        let (tx, mut rx) = mpsc::channel(4);

        // Corrupt the file, then trigger a reload directly.
        std::fs::write(&path, "{ not valid json").unwrap();
        watcher.clone().handle_change(&tx).await;

        assert_eq!(watcher.state().await, WatcherState::Error);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn handle_change_emits_event_on_valid_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{}").unwrap();

        let (watcher, _initial) = ConfigWatcher::new(path.clone()).unwrap();
        let watcher = Arc::new(watcher);
        let (tx, mut rx) = mpsc::channel(4);

        std::fs::write(
            &path,
            serde_json::json!({"mcpServers": {"a": {"type":"stdio","command":"echo"}}}).to_string(),
        )
        .unwrap();
        watcher.clone().handle_change(&tx).await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.current.mcp_servers.len(), 1);
        assert_eq!(watcher.state().await, WatcherState::Watching);
    }
}
