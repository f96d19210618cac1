//! Error taxonomy for the aggregator (spec §7).
//!
//! `ProxyError` is the kind-level enum the router translates into JSON-RPC
//! error envelopes or HTTP status codes. Transport- and config-loading code
//! that only needs `anyhow::Result` (main.rs glue) is unaffected.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("config invalid: {0}")]
    ConfigInvalid(String),

    #[error("upstream '{0}' is disconnected")]
    Disconnected(String),

    #[error("upstream '{0}' reports itself as this aggregator (circular dependency)")]
    CircularDependency(String),

    #[error("request to '{upstream}' timed out after {deadline_ms}ms")]
    Timeout { upstream: String, deadline_ms: u64 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("upstream '{0}' is not visible to this session")]
    NotVisible(String),

    #[error("invalid filter expression: {0}")]
    InvalidFilter(String),

    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("preset '{0}' not found")]
    PresetNotFound(String),

    #[error("auth failed for upstream '{0}': {1}")]
    AuthFailed(String, String),

    #[error("transient upstream error on '{0}': {1}")]
    Transient(String, String),

    #[error("fatal: {0}")]
    Fatal(String),

    #[error("upstream '{upstream}' returned a protocol error: {message}")]
    UpstreamProtocol { upstream: String, message: String },
}

impl ProxyError {
    /// JSON-RPC 2.0 error code for this kind, per spec §7's table.
    pub fn json_rpc_code(&self) -> i64 {
        match self {
            ProxyError::Disconnected(_) => -32000,
            ProxyError::Timeout { .. } => -32001,
            ProxyError::NotFound(_) => -32602,
            ProxyError::NotVisible(_) => -32602,
            ProxyError::InvalidFilter(_) => -32602,
            ProxyError::InvalidCursor(_) => -32602,
            ProxyError::InvalidParams(_) => -32602,
            ProxyError::PresetNotFound(_) => -32602,
            ProxyError::AuthFailed(..) => -32001,
            ProxyError::UpstreamProtocol { .. } => -32000,
            ProxyError::ConfigInvalid(_)
            | ProxyError::CircularDependency(_)
            | ProxyError::Transient(..)
            | ProxyError::Fatal(_) => -32603,
        }
    }

    pub fn to_json_rpc_error(&self, id: serde_json::Value) -> serde_json::Value {
        let mut error = serde_json::json!({
            "code": self.json_rpc_code(),
            "message": self.to_string(),
        });
        if let ProxyError::Timeout { deadline_ms, .. } = self {
            error["data"] = serde_json::json!({ "deadlineMs": deadline_ms });
        }
        serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": error,
        })
    }
}

pub type ProxyResult<T> = Result<T, ProxyError>;
