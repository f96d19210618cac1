//! A single upstream MCP server connection: connect/retry, capability
//! capture, health ping, and JSON-RPC method dispatch.
//!
//! Generalizes the teacher's `McpConnection` (`mcp/connection.rs`) from a
//! per-server desktop-app connection into one leg of the aggregator: the
//! connect/retry/backoff loop and the circular-dependency guard are new
//! (no teacher counterpart — single-upstream proxies can't loop through
//! themselves), everything else — state machine shape, transport dispatch,
//! `execute_request` method table — is carried over near verbatim.

use crate::config::{TransportKind, UpstreamDescriptor};
use crate::error::{ProxyError, ProxyResult};
use crate::oauth::OAuthProvider;
use crate::router::reverse::ReverseHub;
use rmcp::model::{CallToolRequestParam, CreateMessageRequestParam, CreateMessageResult, ListRootsResult};
use rmcp::service::{RequestContext, RunningService};
use rmcp::transport::TokioChildProcess;
use rmcp::ClientHandler;
use rmcp::ErrorData as McpError;
use rmcp::RoleClient;
use rmcp::ServiceExt;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::process::Command;
use tokio::sync::Mutex;

const MAX_CONNECT_ATTEMPTS: u32 = 3;
const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
    Disabled,
}

/// A wrapper around `reqwest::Client` that tolerates servers returning 404
/// (or other non-405 errors) on DELETE session requests, instead of logging
/// them as hard failures (carried from the teacher's `GracefulHttpClient`).
#[derive(Clone)]
struct GracefulHttpClient(reqwest::Client);

impl rmcp::transport::streamable_http_client::StreamableHttpClient for GracefulHttpClient {
    type Error = reqwest::Error;

    fn post_message(
        &self,
        uri: Arc<str>,
        message: rmcp::model::ClientJsonRpcMessage,
        session_id: Option<Arc<str>>,
        auth_header: Option<String>,
    ) -> impl std::future::Future<
        Output = std::result::Result<
            rmcp::transport::streamable_http_client::StreamableHttpPostResponse,
            rmcp::transport::streamable_http_client::StreamableHttpError<Self::Error>,
        >,
    > + Send
           + '_ {
        rmcp::transport::streamable_http_client::StreamableHttpClient::post_message(
            &self.0, uri, message, session_id, auth_header,
        )
    }

    fn get_stream(
        &self,
        uri: Arc<str>,
        session_id: Arc<str>,
        last_event_id: Option<String>,
        auth_header: Option<String>,
    ) -> impl std::future::Future<
        Output = std::result::Result<
            futures::stream::BoxStream<'static, std::result::Result<sse_stream::Sse, sse_stream::Error>>,
            rmcp::transport::streamable_http_client::StreamableHttpError<Self::Error>,
        >,
    > + Send
           + '_ {
        rmcp::transport::streamable_http_client::StreamableHttpClient::get_stream(
            &self.0,
            uri,
            session_id,
            last_event_id,
            auth_header,
        )
    }

    async fn delete_session(
        &self,
        uri: Arc<str>,
        session: Arc<str>,
        auth_token: Option<String>,
    ) -> std::result::Result<(), rmcp::transport::streamable_http_client::StreamableHttpError<Self::Error>> {
        use rmcp::transport::common::http_header::HEADER_SESSION_ID;

        let mut request_builder = self.0.delete(uri.as_ref());
        if let Some(auth_header) = auth_token {
            request_builder = request_builder.bearer_auth(auth_header);
        }
        let response = request_builder
            .header(HEADER_SESSION_ID, session.as_ref())
            .send()
            .await
            .map_err(rmcp::transport::streamable_http_client::StreamableHttpError::Client)?;

        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::METHOD_NOT_ALLOWED {
            // fine
        } else if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::BAD_REQUEST {
            tracing::debug!(%status, session_id = session.as_ref(), "session delete returned {}, treating as unsupported", status);
        } else {
            tracing::warn!(%status, session_id = session.as_ref(), "unexpected status on session delete: {}", status);
        }

        Ok(())
    }
}

/// Lightweight snapshot of the capability surface fetched after connect.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    pub tools: Vec<rmcp::model::Tool>,
    pub resources: Vec<rmcp::model::Resource>,
    pub resource_templates: Vec<rmcp::model::RawResourceTemplate>,
    pub prompts: Vec<rmcp::model::Prompt>,
}

pub struct UpstreamConnection {
    pub descriptor: UpstreamDescriptor,
    /// This agent's own identity string, used for the self-loop guard.
    agent_name: String,
    state: Arc<Mutex<ConnectionState>>,
    service: Arc<Mutex<Option<RunningService<RoleClient, ReverseBridge>>>>,
    capabilities: Arc<Mutex<Capabilities>>,
    connected_at: Arc<Mutex<Option<SystemTime>>>,
    last_ping: Arc<Mutex<Option<SystemTime>>>,
    error_message: Arc<Mutex<Option<String>>>,
    reconnect_attempts: Arc<Mutex<u32>>,
    oauth: Option<Arc<dyn OAuthProvider>>,
    reverse: Arc<ReverseHub>,
}

impl UpstreamConnection {
    pub fn new(descriptor: UpstreamDescriptor, agent_name: String, oauth: Option<Arc<dyn OAuthProvider>>, reverse: Arc<ReverseHub>) -> Self {
        Self {
            descriptor,
            agent_name,
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            service: Arc::new(Mutex::new(None)),
            capabilities: Arc::new(Mutex::new(Capabilities::default())),
            connected_at: Arc::new(Mutex::new(None)),
            last_ping: Arc::new(Mutex::new(None)),
            error_message: Arc::new(Mutex::new(None)),
            reconnect_attempts: Arc::new(Mutex::new(0)),
            oauth,
            reverse,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.lock().await
    }

    async fn set_state(&self, new_state: ConnectionState) {
        let mut state = self.state.lock().await;
        tracing::info!("upstream '{}': {:?} -> {:?}", self.descriptor.name, *state, new_state);
        *state = new_state;
        match new_state {
            ConnectionState::Connected => {
                *self.connected_at.lock().await = Some(SystemTime::now());
                *self.error_message.lock().await = None;
                *self.reconnect_attempts.lock().await = 0;
            }
            ConnectionState::Disconnected => {
                *self.connected_at.lock().await = None;
            }
            _ => {}
        }
    }

    /// Marks this connection `Disabled` without ever attempting a transport.
    /// Used for descriptors with `disabled: true` so the manager's result
    /// map still carries an entry for every configured upstream.
    pub async fn mark_disabled(&self) {
        self.set_state(ConnectionState::Disabled).await;
    }

    pub async fn reconnect_attempts(&self) -> u32 {
        *self.reconnect_attempts.lock().await
    }

    pub async fn bump_reconnect_attempts(&self) {
        *self.reconnect_attempts.lock().await += 1;
    }

    /// Connect with bounded retry and exponential backoff (3 attempts,
    /// starting at 1s, doubling each time) before giving up for this cycle;
    /// the caller's health loop will retry again on its own interval.
    pub async fn connect(&self) -> ProxyResult<()> {
        self.set_state(ConnectionState::Connecting).await;

        let mut delay = INITIAL_RETRY_DELAY;
        let mut last_err = None;

        for attempt in 1..=MAX_CONNECT_ATTEMPTS {
            match self.try_connect_once().await {
                Ok(()) => {
                    self.fetch_capabilities_best_effort().await;
                    self.set_state(ConnectionState::Connected).await;
                    return Ok(());
                }
                Err(e @ ProxyError::CircularDependency(_)) => {
                    tracing::error!("upstream '{}': {}, not retrying", self.descriptor.name, e);
                    *self.error_message.lock().await = Some(e.to_string());
                    self.set_state(ConnectionState::Error).await;
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(
                        "upstream '{}': connect attempt {}/{} failed: {}",
                        self.descriptor.name,
                        attempt,
                        MAX_CONNECT_ATTEMPTS,
                        e
                    );
                    last_err = Some(e);
                    if attempt < MAX_CONNECT_ATTEMPTS {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }

        let err = last_err.unwrap_or_else(|| ProxyError::Disconnected(self.descriptor.name.clone()));
        *self.error_message.lock().await = Some(err.to_string());
        self.set_state(ConnectionState::Error).await;
        Err(err)
    }

    async fn try_connect_once(&self) -> ProxyResult<()> {
        let result = match self.descriptor.transport().map_err(ProxyError::ConfigInvalid)? {
            TransportKind::Stdio => self.connect_stdio().await,
            TransportKind::Sse => self.connect_sse().await,
            TransportKind::Http => self.connect_http().await,
        };
        result?;
        self.guard_against_self_loop().await
    }

    /// Spec §4.1: if the upstream's own `serverInfo.name` equals this
    /// agent's name, refuse the connection — it would otherwise be possible
    /// to configure the aggregator as an upstream of itself, looping
    /// requests forever.
    async fn guard_against_self_loop(&self) -> ProxyResult<()> {
        let service_lock = self.service.lock().await;
        let Some(service) = service_lock.as_ref() else {
            return Ok(());
        };
        if let Some(info) = service.peer_info() {
            if info.server_info.name == self.agent_name {
                drop(service_lock);
                self.disconnect().await;
                return Err(ProxyError::CircularDependency(self.descriptor.name.clone()));
            }
        }
        Ok(())
    }

    async fn connect_stdio(&self) -> ProxyResult<()> {
        let command_str = self
            .descriptor
            .command
            .as_ref()
            .ok_or_else(|| ProxyError::ConfigInvalid("no command specified for stdio transport".into()))?
            .trim();

        if command_str.is_empty() {
            return Err(ProxyError::ConfigInvalid("no command specified for stdio transport".into()));
        }

        let (executable, extra_args) = if let Some(space) = command_str.find(' ') {
            let (exe, rest) = command_str.split_at(space);
            let rest_args: Vec<String> = rest.trim().split_whitespace().map(|s| s.to_string()).collect();
            (exe.to_string(), rest_args)
        } else {
            (command_str.to_string(), Vec::new())
        };

        let mut args = self.descriptor.args.clone().unwrap_or_default();
        args.splice(0..0, extra_args);

        let mut cmd = Command::new(&executable);
        cmd.args(&args).stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped());

        if let Some(cwd) = &self.descriptor.cwd {
            cmd.current_dir(cwd);
        }
        if let Some(env) = &self.descriptor.env {
            for (key, value) in env {
                cmd.env(key, value);
            }
        }

        let transport = TokioChildProcess::new(cmd).map_err(|e| {
            ProxyError::Fatal(format!("failed to spawn upstream '{}' process: {}", self.descriptor.name, e))
        })?;

        let service = ReverseBridge::new(self.reverse.clone())
            .serve(transport)
            .await
            .map_err(|e| ProxyError::Transient(self.descriptor.name.clone(), e.to_string()))?;

        *self.service.lock().await = Some(service);
        Ok(())
    }

    async fn connect_sse(&self) -> ProxyResult<()> {
        let url = self
            .descriptor
            .url
            .as_ref()
            .ok_or_else(|| ProxyError::ConfigInvalid("no URL specified for SSE transport".into()))?;

        use super::legacy_sse::LegacySseWorker;
        use rmcp::transport::worker::WorkerTransport;

        let mut worker = LegacySseWorker::from_url(url.as_str())
            .map_err(|e| ProxyError::ConfigInvalid(format!("invalid SSE URL: {}", e)))?;

        if let Some(headers) = self.resolved_headers().await {
            let header_vec: Vec<(String, String)> = headers.into_iter().collect();
            worker = worker.with_headers(header_vec);
        }

        let transport = WorkerTransport::spawn(worker);
        let service = ReverseBridge::new(self.reverse.clone())
            .serve(transport)
            .await
            .map_err(|e| ProxyError::Transient(self.descriptor.name.clone(), e.to_string()))?;

        *self.service.lock().await = Some(service);
        Ok(())
    }

    async fn connect_http(&self) -> ProxyResult<()> {
        let url = self
            .descriptor
            .url
            .as_ref()
            .ok_or_else(|| ProxyError::ConfigInvalid("no URL specified for HTTP transport".into()))?;

        use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
        use rmcp::transport::StreamableHttpClientTransport;

        let connect_timeout = Duration::from_secs(self.descriptor.connection_timeout_ms.unwrap_or(30_000) / 1000);
        let mut client_builder = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90));

        if let Some(headers) = self.resolved_headers().await {
            let mut header_map = reqwest::header::HeaderMap::new();
            for (key, value) in headers {
                if let (Ok(name), Ok(val)) = (
                    reqwest::header::HeaderName::from_bytes(key.as_bytes()),
                    reqwest::header::HeaderValue::from_str(&value),
                ) {
                    header_map.insert(name, val);
                } else {
                    tracing::warn!("upstream '{}': skipping invalid header '{}'", self.descriptor.name, key);
                }
            }
            client_builder = client_builder.default_headers(header_map);
        }

        let client = client_builder
            .build()
            .map_err(|e| ProxyError::Fatal(format!("failed to build HTTP client: {}", e)))?;

        let config = StreamableHttpClientTransportConfig::with_uri(url.as_str());
        let transport = StreamableHttpClientTransport::with_client(GracefulHttpClient(client), config);

        let service = ReverseBridge::new(self.reverse.clone())
            .serve(transport)
            .await
            .map_err(|e| ProxyError::Transient(self.descriptor.name.clone(), e.to_string()))?;

        *self.service.lock().await = Some(service);
        Ok(())
    }

    /// Merge static headers with a live bearer token from the OAuth provider,
    /// if one is configured for this upstream (spec §4.1, §7).
    async fn resolved_headers(&self) -> Option<std::collections::HashMap<String, String>> {
        let mut headers = self.descriptor.headers.clone().unwrap_or_default();
        if let Some(oauth) = &self.oauth {
            match oauth.access_token(&self.descriptor.name).await {
                Ok(token) => {
                    headers.insert("Authorization".to_string(), format!("Bearer {}", token));
                }
                Err(e) => {
                    tracing::warn!("upstream '{}': oauth token fetch failed: {}", self.descriptor.name, e);
                }
            }
        }
        if headers.is_empty() {
            None
        } else {
            Some(headers)
        }
    }

    async fn fetch_capabilities_best_effort(&self) {
        if let Err(e) = self.fetch_capabilities().await {
            tracing::warn!("upstream '{}': connected but failed to fetch capabilities: {}", self.descriptor.name, e);
        }
    }

    async fn fetch_capabilities(&self) -> ProxyResult<()> {
        let service_lock = self.service.lock().await;
        let service = service_lock
            .as_ref()
            .ok_or_else(|| ProxyError::Disconnected(self.descriptor.name.clone()))?;

        let mut caps = Capabilities::default();

        match service.list_all_tools().await {
            Ok(tools) => caps.tools = tools,
            Err(e) => tracing::warn!("upstream '{}': failed to list tools: {}", self.descriptor.name, e),
        }
        match service.list_all_resources().await {
            Ok(resources) => caps.resources = resources,
            Err(e) => tracing::warn!("upstream '{}': failed to list resources: {}", self.descriptor.name, e),
        }
        match service.list_resource_templates(Default::default()).await {
            Ok(result) => caps.resource_templates = result.resource_templates,
            Err(e) => tracing::debug!("upstream '{}': resource templates unsupported: {}", self.descriptor.name, e),
        }
        match service.list_all_prompts().await {
            Ok(prompts) => caps.prompts = prompts,
            Err(e) => tracing::debug!("upstream '{}': prompts unsupported: {}", self.descriptor.name, e),
        }

        tracing::info!(
            "upstream '{}': {} tools, {} resources, {} prompts",
            self.descriptor.name,
            caps.tools.len(),
            caps.resources.len(),
            caps.prompts.len()
        );
        *self.capabilities.lock().await = caps;
        Ok(())
    }

    pub async fn capabilities(&self) -> Capabilities {
        self.capabilities.lock().await.clone()
    }

    pub async fn ping(&self) -> ProxyResult<()> {
        let service_lock = self.service.lock().await;
        let service = service_lock
            .as_ref()
            .ok_or_else(|| ProxyError::Disconnected(self.descriptor.name.clone()))?;

        service
            .list_tools(Default::default())
            .await
            .map_err(|e| ProxyError::Transient(self.descriptor.name.clone(), format!("health check failed: {}", e)))?;

        *self.last_ping.lock().await = Some(SystemTime::now());
        Ok(())
    }

    /// Disconnect, waiting up to `deadline` for in-flight requests to drain
    /// before forcing cancellation (spec §4.1 graceful close).
    pub async fn disconnect_graceful(&self, deadline: Duration) {
        let result = tokio::time::timeout(deadline, self.disconnect()).await;
        if result.is_err() {
            tracing::warn!("upstream '{}': graceful close timed out, forcing", self.descriptor.name);
        }
    }

    pub async fn disconnect(&self) {
        if let Some(service) = self.service.lock().await.take() {
            let _ = service.cancel().await;
        }
        *self.capabilities.lock().await = Capabilities::default();
        self.set_state(ConnectionState::Disconnected).await;
    }

    pub async fn connected_at(&self) -> Option<SystemTime> {
        *self.connected_at.lock().await
    }

    pub async fn last_ping(&self) -> Option<SystemTime> {
        *self.last_ping.lock().await
    }

    pub async fn error_message(&self) -> Option<String> {
        self.error_message.lock().await.clone()
    }

    /// Execute a JSON-RPC method against this upstream. Returns the
    /// `result` value on success (not the full JSON-RPC envelope).
    ///
    /// On what looks like an auth failure from an OAuth-backed upstream,
    /// pauses to refresh the token and recreate the transport, then retries
    /// once (spec §4.1: "on 401 ... pause outgoing requests, invoke the
    /// provider to refresh, and recreate the transport"). rmcp's transport
    /// errors don't carry a typed HTTP status, so the 401 is detected by
    /// string-matching the upstream error message.
    pub async fn execute_request(&self, method: &str, params: serde_json::Value) -> ProxyResult<serde_json::Value> {
        let first = self.execute_request_once(method, params.clone()).await;
        let Err(e) = &first else { return first };
        let Some(oauth) = &self.oauth else { return first };
        if !looks_like_auth_failure(e) {
            return first;
        }

        tracing::warn!("upstream '{}': request failed with apparent auth error, refreshing token", self.descriptor.name);
        if let Err(refresh_err) = oauth.refresh(&self.descriptor.name).await {
            tracing::warn!("upstream '{}': token refresh failed: {}", self.descriptor.name, refresh_err);
            return first;
        }

        self.disconnect().await;
        self.connect().await?;
        self.execute_request_once(method, params).await
    }

    async fn execute_request_once(&self, method: &str, params: serde_json::Value) -> ProxyResult<serde_json::Value> {
        let service_lock = self.service.lock().await;
        let service = service_lock
            .as_ref()
            .ok_or_else(|| ProxyError::Disconnected(self.descriptor.name.clone()))?;

        let to_upstream_err =
            |e: std::fmt::Arguments| ProxyError::UpstreamProtocol { upstream: self.descriptor.name.clone(), message: format!("{}", e) };

        let result = match method {
            "ping" => {
                let _ = service
                    .list_tools(Default::default())
                    .await
                    .map_err(|e| to_upstream_err(format_args!("ping failed: {}", e)))?;
                serde_json::json!({})
            }
            "tools/list" => {
                let result = service
                    .list_tools(Default::default())
                    .await
                    .map_err(|e| to_upstream_err(format_args!("tools/list failed: {}", e)))?;
                serde_json::to_value(&result).map_err(|e| ProxyError::Fatal(e.to_string()))?
            }
            "tools/call" => {
                let tool_params: CallToolRequestParam = serde_json::from_value(params)
                    .map_err(|e| ProxyError::InvalidParams(e.to_string()))?;
                let result = service
                    .call_tool(tool_params)
                    .await
                    .map_err(|e| to_upstream_err(format_args!("tools/call failed: {}", e)))?;
                serde_json::to_value(&result).map_err(|e| ProxyError::Fatal(e.to_string()))?
            }
            "resources/list" => {
                let result = service
                    .list_resources(Default::default())
                    .await
                    .map_err(|e| to_upstream_err(format_args!("resources/list failed: {}", e)))?;
                serde_json::to_value(&result).map_err(|e| ProxyError::Fatal(e.to_string()))?
            }
            "resources/read" => {
                let read_params = serde_json::from_value(params).map_err(|e| ProxyError::InvalidParams(e.to_string()))?;
                let result = service
                    .read_resource(read_params)
                    .await
                    .map_err(|e| to_upstream_err(format_args!("resources/read failed: {}", e)))?;
                serde_json::to_value(&result).map_err(|e| ProxyError::Fatal(e.to_string()))?
            }
            "resources/templates/list" => {
                let result = service
                    .list_resource_templates(Default::default())
                    .await
                    .map_err(|e| to_upstream_err(format_args!("resources/templates/list failed: {}", e)))?;
                serde_json::to_value(&result).map_err(|e| ProxyError::Fatal(e.to_string()))?
            }
            "prompts/list" => {
                let result = service
                    .list_prompts(Default::default())
                    .await
                    .map_err(|e| to_upstream_err(format_args!("prompts/list failed: {}", e)))?;
                serde_json::to_value(&result).map_err(|e| ProxyError::Fatal(e.to_string()))?
            }
            "prompts/get" => {
                let prompt_params = serde_json::from_value(params).map_err(|e| ProxyError::InvalidParams(e.to_string()))?;
                let result = service
                    .get_prompt(prompt_params)
                    .await
                    .map_err(|e| to_upstream_err(format_args!("prompts/get failed: {}", e)))?;
                serde_json::to_value(&result).map_err(|e| ProxyError::Fatal(e.to_string()))?
            }
            "resources/subscribe" => {
                let sub_params = serde_json::from_value(params).map_err(|e| ProxyError::InvalidParams(e.to_string()))?;
                service
                    .subscribe(sub_params)
                    .await
                    .map_err(|e| to_upstream_err(format_args!("resources/subscribe failed: {}", e)))?;
                serde_json::json!({})
            }
            "resources/unsubscribe" => {
                let unsub_params = serde_json::from_value(params).map_err(|e| ProxyError::InvalidParams(e.to_string()))?;
                service
                    .unsubscribe(unsub_params)
                    .await
                    .map_err(|e| to_upstream_err(format_args!("resources/unsubscribe failed: {}", e)))?;
                serde_json::json!({})
            }
            "completion/complete" => {
                let complete_params = serde_json::from_value(params).map_err(|e| ProxyError::InvalidParams(e.to_string()))?;
                let result = service
                    .complete(complete_params)
                    .await
                    .map_err(|e| to_upstream_err(format_args!("completion/complete failed: {}", e)))?;
                serde_json::to_value(&result).map_err(|e| ProxyError::Fatal(e.to_string()))?
            }
            "logging/setLevel" => {
                let level_params = serde_json::from_value(params).map_err(|e| ProxyError::InvalidParams(e.to_string()))?;
                service
                    .set_level(level_params)
                    .await
                    .map_err(|e| to_upstream_err(format_args!("logging/setLevel failed: {}", e)))?;
                serde_json::json!({})
            }
            other => {
                return Err(ProxyError::NotFound(format!("method not found: {}", other)));
            }
        };

        Ok(result)
    }
}

fn looks_like_auth_failure(e: &ProxyError) -> bool {
    let msg = e.to_string().to_lowercase();
    msg.contains("401") || msg.contains("unauthorized")
}

/// The client side of an upstream connection: answers server-initiated
/// requests (`roots/list`, `sampling/createMessage`) by forwarding them
/// through the shared [`ReverseHub`] to whichever inbound session(s) can
/// actually answer on behalf of a real client.
///
/// `elicitation/create` is in [`crate::router::reverse::REVERSE_METHODS`]
/// but has no override here: it's a newer addition to the protocol than
/// sampling/roots and without a confirmed method name on this trait, a
/// guess risks silently no-opping rather than failing loud. An upstream
/// that sends it gets rmcp's default "unsupported" response until this is
/// filled in.
#[derive(Clone)]
pub struct ReverseBridge {
    hub: Arc<ReverseHub>,
}

impl ReverseBridge {
    pub fn new(hub: Arc<ReverseHub>) -> Self {
        Self { hub }
    }
}

impl ClientHandler for ReverseBridge {
    async fn create_message(
        &self,
        params: CreateMessageRequestParam,
        _context: RequestContext<RoleClient>,
    ) -> Result<CreateMessageResult, McpError> {
        let value = serde_json::to_value(&params).map_err(|e| McpError::internal_error(e.to_string(), None))?;
        let result = self
            .hub
            .forward("sampling/createMessage", value)
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        serde_json::from_value(result).map_err(|e| McpError::internal_error(e.to_string(), None))
    }

    async fn list_roots(&self, _context: RequestContext<RoleClient>) -> Result<ListRootsResult, McpError> {
        let result = self
            .hub
            .forward("roots/list", serde_json::json!({}))
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        serde_json::from_value(result).map_err(|e| McpError::internal_error(e.to_string(), None))
    }
}
