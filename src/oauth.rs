//! OAuth access-token provider contract for upstreams configured with
//! `oauthProvider` (spec §4.1, §7).
//!
//! No teacher counterpart — the desktop app only ever carried static
//! headers. Shaped after the teacher's small-trait-object style (see
//! `mcp/connection.rs`'s `StreamableHttpClient` impl) so swapping in a real
//! provider (device-code flow, client-credentials, a secrets manager) means
//! implementing one trait rather than touching the connection code.

use crate::error::{ProxyError, ProxyResult};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

/// Supplies (and refreshes) bearer tokens for a named upstream.
#[async_trait::async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Current access token for `upstream_name`, refreshing first if the
    /// cached one is expired or absent.
    async fn access_token(&self, upstream_name: &str) -> ProxyResult<String>;

    /// Force a refresh, e.g. after the upstream returns 401. Concurrent
    /// callers observing the same 401 must coalesce onto one refresh.
    async fn refresh(&self, upstream_name: &str) -> ProxyResult<String>;
}

/// stdio transports have no request/response cycle rmcp exposes status
/// codes on, so there is nothing to refresh against (spec §9 design note:
/// OAuth is HTTP/SSE-only). Any `oauthProvider` configured on a stdio
/// upstream is a configuration error, not a silent no-op.
pub struct UnsupportedAuth;

#[async_trait::async_trait]
impl OAuthProvider for UnsupportedAuth {
    async fn access_token(&self, upstream_name: &str) -> ProxyResult<String> {
        Err(ProxyError::AuthFailed(
            upstream_name.to_string(),
            "oauth is not supported over stdio transport".to_string(),
        ))
    }

    async fn refresh(&self, upstream_name: &str) -> ProxyResult<String> {
        self.access_token(upstream_name).await
    }
}

/// A static bearer token, useful for providers backed by a long-lived PAT
/// or a token minted out-of-band (e.g. by a sidecar) and written to an
/// environment variable.
pub struct StaticTokenProvider {
    tokens: DashMap<String, String>,
}

impl StaticTokenProvider {
    pub fn new() -> Self {
        Self { tokens: DashMap::new() }
    }

    pub fn set(&self, upstream_name: &str, token: String) {
        self.tokens.insert(upstream_name.to_string(), token);
    }
}

impl Default for StaticTokenProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl OAuthProvider for StaticTokenProvider {
    async fn access_token(&self, upstream_name: &str) -> ProxyResult<String> {
        self.tokens
            .get(upstream_name)
            .map(|t| t.clone())
            .ok_or_else(|| ProxyError::AuthFailed(upstream_name.to_string(), "no token configured".to_string()))
    }

    async fn refresh(&self, upstream_name: &str) -> ProxyResult<String> {
        self.access_token(upstream_name).await
    }
}

/// Wraps a slow/fallible [`OAuthProvider`] refresh with in-flight
/// coalescing: concurrent 401s on the same upstream share one refresh
/// future instead of stampeding the token endpoint (same pattern as
/// `lazy::cache`'s schema-fetch coalescing).
pub struct CoalescingRefresh<P: OAuthProvider> {
    inner: P,
    in_flight: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl<P: OAuthProvider> CoalescingRefresh<P> {
    pub fn new(inner: P) -> Self {
        Self { inner, in_flight: DashMap::new() }
    }

    fn lock_for(&self, upstream_name: &str) -> Arc<AsyncMutex<()>> {
        self.in_flight
            .entry(upstream_name.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

#[async_trait::async_trait]
impl<P: OAuthProvider> OAuthProvider for CoalescingRefresh<P> {
    async fn access_token(&self, upstream_name: &str) -> ProxyResult<String> {
        self.inner.access_token(upstream_name).await
    }

    async fn refresh(&self, upstream_name: &str) -> ProxyResult<String> {
        let lock = self.lock_for(upstream_name);
        let _guard = lock.lock().await;
        self.inner.refresh(upstream_name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_provider_returns_configured_token() {
        let provider = StaticTokenProvider::new();
        provider.set("upstream-a", "tok-123".to_string());
        assert_eq!(provider.access_token("upstream-a").await.unwrap(), "tok-123");
    }

    #[tokio::test]
    async fn static_provider_errors_on_unknown_upstream() {
        let provider = StaticTokenProvider::new();
        assert!(provider.access_token("missing").await.is_err());
    }

    #[tokio::test]
    async fn unsupported_auth_always_fails() {
        let provider = UnsupportedAuth;
        assert!(provider.access_token("stdio-upstream").await.is_err());
    }

    #[tokio::test]
    async fn coalescing_refresh_delegates_to_inner() {
        let provider = CoalescingRefresh::new(StaticTokenProvider::new());
        provider.inner.set("a", "tok".to_string());
        assert_eq!(provider.refresh("a").await.unwrap(), "tok");
    }
}
