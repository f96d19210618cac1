//! PID file & bridge discovery (spec §4.8): the aggregator writes
//! `<config-dir>/server.pid` on startup and removes it on clean exit so the
//! `agg-mcp-bridge` stdio adapter (and anything else shelling out to us)
//! can find a running instance without a hardcoded port.

use crate::error::{ProxyError, ProxyResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PidFile {
    pub pid: u32,
    pub url: String,
    pub port: u16,
    pub host: String,
    pub transport: String,
    #[serde(rename = "startedAt")]
    pub started_at: String,
    #[serde(rename = "configDir")]
    pub config_dir: String,
}

impl PidFile {
    pub fn new(port: u16, host: &str, transport: &str, config_dir: &Path, started_at: String) -> Self {
        Self {
            pid: std::process::id(),
            url: format!("http://{}:{}/mcp", host, port),
            port,
            host: host.to_string(),
            transport: transport.to_string(),
            started_at,
            config_dir: config_dir.display().to_string(),
        }
    }

    pub fn path_for(config_dir: &Path) -> PathBuf {
        config_dir.join("server.pid")
    }

    pub fn write(&self, config_dir: &Path) -> ProxyResult<()> {
        let path = Self::path_for(config_dir);
        let json = serde_json::to_string_pretty(self).map_err(|e| ProxyError::Fatal(format!("failed to serialize PID file: {}", e)))?;
        std::fs::write(&path, json).map_err(|e| ProxyError::Fatal(format!("failed to write PID file {}: {}", path.display(), e)))?;
        tracing::info!("wrote PID file {}", path.display());
        Ok(())
    }

    pub fn read(config_dir: &Path) -> ProxyResult<Self> {
        let path = Self::path_for(config_dir);
        let contents = std::fs::read_to_string(&path).map_err(|e| ProxyError::NotFound(format!("no PID file at {}: {}", path.display(), e)))?;
        serde_json::from_str(&contents).map_err(|e| ProxyError::ConfigInvalid(format!("malformed PID file {}: {}", path.display(), e)))
    }

    pub fn remove(config_dir: &Path) {
        let path = Self::path_for(config_dir);
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::info!("removed PID file {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("failed to remove PID file {}: {}", path.display(), e),
        }
    }

    /// True if `self.pid` names a live process. Sends signal 0 (no-op,
    /// existence check only per `kill(2)`).
    pub fn is_live(&self) -> bool {
        is_pid_live(self.pid)
    }
}

#[cfg(unix)]
fn is_pid_live(pid: u32) -> bool {
    // SAFETY: signal 0 performs no action beyond existence/permission
    // checks; it never delivers a real signal to the target process.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
fn is_pid_live(_pid: u32) -> bool {
    false
}

/// Small range of ports to probe when the PID file is missing or stale, by
/// hitting `/health` on each candidate (spec §4.8, "port-scan fallback").
pub const DISCOVERY_PORT_RANGE: std::ops::RangeInclusive<u16> = 3051..=3060;

/// Discover a running instance's base URL: trust the PID file if it names a
/// live process, otherwise probe the fallback port range.
pub async fn discover(config_dir: &Path, client: &reqwest::Client) -> ProxyResult<String> {
    if let Ok(pidfile) = PidFile::read(config_dir) {
        if pidfile.is_live() {
            return Ok(pidfile.url.trim_end_matches("/mcp").to_string());
        }
        tracing::warn!("PID file at {} names a dead process ({}), falling back to port scan", config_dir.display(), pidfile.pid);
    }

    for port in DISCOVERY_PORT_RANGE {
        let base = format!("http://127.0.0.1:{}", port);
        if client.get(format!("{}/health", base)).send().await.map(|r| r.status().is_success()).unwrap_or(false) {
            return Ok(base);
        }
    }

    Err(ProxyError::NotFound("no running aggregator instance found (PID file stale and port scan exhausted)".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = PidFile::new(3051, "127.0.0.1", "http", dir.path(), "2026-01-01T00:00:00Z".to_string());
        pidfile.write(dir.path()).unwrap();

        let read_back = PidFile::read(dir.path()).unwrap();
        assert_eq!(read_back.pid, std::process::id());
        assert_eq!(read_back.port, 3051);
        assert_eq!(read_back.url, "http://127.0.0.1:3051/mcp");
    }

    #[test]
    fn remove_deletes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = PidFile::new(3051, "127.0.0.1", "http", dir.path(), "2026-01-01T00:00:00Z".to_string());
        pidfile.write(dir.path()).unwrap();
        PidFile::remove(dir.path());
        assert!(PidFile::read(dir.path()).is_err());
    }

    #[test]
    fn remove_on_missing_file_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        PidFile::remove(dir.path());
    }

    #[test]
    fn own_process_is_reported_live() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = PidFile::new(3051, "127.0.0.1", "http", dir.path(), "2026-01-01T00:00:00Z".to_string());
        assert!(pidfile.is_live());
    }

    #[test]
    fn bogus_pid_is_reported_dead() {
        let mut pidfile = PidFile::new(3051, "127.0.0.1", "http", Path::new("/tmp"), "2026-01-01T00:00:00Z".to_string());
        pidfile.pid = u32::MAX;
        assert!(!pidfile.is_live());
    }
}
