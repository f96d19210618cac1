//! Aggregated inbound HTTP transport (spec §4.7, §6): one `/mcp` endpoint
//! presenting the union of every upstream, plus the deprecated `/sse` +
//! `/messages` pair retained for older clients.
//!
//! Grounded directly on the teacher's `proxy::server::create_router`
//! (`/health`, `/mcps`, axum + `tower-http` CORS, the
//! `handle_single_request`/batch dispatch shape) generalized from "one
//! router per upstream id" to "one router for the whole aggregate," with
//! session creation and tag-filter query params layered on top.

use crate::error::{ProxyError, ProxyResult};
use crate::lazy::LazyOrchestrator;
use crate::router::pagination::PaginationMode;
use crate::router::reverse::ClientCallback;
use async_trait::async_trait;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router as AxumRouter;
use dashmap::DashMap;
use futures::stream::Stream;
use serde::Deserialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::{BroadcastStream, UnboundedReceiverStream};
use tokio_stream::StreamExt;
use tower_http::cors::{Any, CorsLayer};

pub const SESSION_HEADER: &str = "MCP-Session-Id";
const REVERSE_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-session state for pushing server-initiated requests down the SSE
/// stream and correlating their replies, which come back as ordinary
/// `POST /mcp` bodies shaped like a response (no `method`).
#[derive(Default)]
struct HttpReverseState {
    next_id: AtomicI64,
    pending: DashMap<i64, oneshot::Sender<serde_json::Value>>,
    push_channels: DashMap<String, mpsc::UnboundedSender<serde_json::Value>>,
}

/// Routes a reverse call to one session's SSE stream and waits for the
/// matching response to arrive through `HttpReverseState::resolve`.
struct HttpClientCallback {
    session_id: String,
    state: Arc<HttpReverseState>,
}

#[async_trait]
impl ClientCallback for HttpClientCallback {
    async fn forward(&self, method: &str, params: serde_json::Value) -> ProxyResult<serde_json::Value> {
        let push = self
            .state
            .push_channels
            .get(&self.session_id)
            .ok_or_else(|| ProxyError::Disconnected(self.session_id.clone()))?
            .clone();

        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.state.pending.insert(id, tx);

        let request = serde_json::json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        if push.send(request).is_err() {
            self.state.pending.remove(&id);
            return Err(ProxyError::Disconnected(self.session_id.clone()));
        }

        let response = tokio::time::timeout(REVERSE_CALL_TIMEOUT, rx).await.map_err(|_| {
            self.state.pending.remove(&id);
            ProxyError::Timeout { upstream: self.session_id.clone(), deadline_ms: REVERSE_CALL_TIMEOUT.as_millis() as u64 }
        })?;
        let response = response.map_err(|_| ProxyError::Disconnected(self.session_id.clone()))?;

        if let Some(error) = response.get("error") {
            return Err(ProxyError::UpstreamProtocol { upstream: self.session_id.clone(), message: error.to_string() });
        }
        Ok(response.get("result").cloned().unwrap_or(serde_json::Value::Null))
    }
}

impl HttpReverseState {
    /// Resolves a pending reverse call if `body` looks like a JSON-RPC
    /// response (an `id` plus `result`/`error`, no `method`). Returns `true`
    /// if it consumed the body this way.
    fn try_resolve(&self, body: &serde_json::Value) -> bool {
        if body.get("method").is_some() {
            return false;
        }
        let Some(id) = body.get("id").and_then(|v| v.as_i64()) else { return false };
        if body.get("result").is_none() && body.get("error").is_none() {
            return false;
        }
        if let Some((_, tx)) = self.pending.remove(&id) {
            let _ = tx.send(body.clone());
        }
        true
    }
}

#[derive(Clone)]
pub struct InboundState {
    pub lazy: Arc<LazyOrchestrator>,
    reverse_http: Arc<HttpReverseState>,
}

pub fn create_router(lazy: Arc<LazyOrchestrator>) -> AxumRouter {
    let state = InboundState { lazy, reverse_http: Arc::new(HttpReverseState::default()) };

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    AxumRouter::new()
        .route("/health", get(health_check))
        .route("/mcp", get(mcp_get).post(mcp_post).delete(mcp_delete))
        .route("/sse", get(sse_stream))
        .route("/messages", post(messages_post))
        .route("/presets", get(list_presets))
        .route("/presets/:name", post(upsert_preset).delete(remove_preset))
        .layer(cors)
        .with_state(state)
}

pub async fn start_http_server(port: u16, lazy: Arc<LazyOrchestrator>) -> crate::error::ProxyResult<()> {
    let app = create_router(lazy);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    tracing::info!("starting aggregated MCP HTTP proxy on http://127.0.0.1:{}", port);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ProxyError::Fatal(format!("failed to bind {}: {}", addr, e)))?;
    axum::serve(listener, app).await.map_err(|e| ProxyError::Fatal(format!("server error: {}", e)))?;
    Ok(())
}

async fn health_check(State(state): State<InboundState>) -> impl IntoResponse {
    let upstreams = state.lazy.router().upstreams.names().await;
    Json(serde_json::json!({
        "status": "ok",
        "upstreams": upstreams.len(),
        "sessions": state.lazy.router().sessions.len(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Admin surface over `PresetStore` (spec §4.5): create/update/delete a
/// named tag-filter preset. There's no separate admin auth here — operators
/// are expected to put this behind the same network boundary as the rest of
/// the aggregated endpoint.
async fn list_presets(State(state): State<InboundState>) -> impl IntoResponse {
    Json(serde_json::json!({ "presets": state.lazy.router().presets.list() }))
}

#[derive(Debug, Deserialize)]
struct UpsertPresetBody {
    expression: String,
}

async fn upsert_preset(State(state): State<InboundState>, Path(name): Path<String>, Json(body): Json<UpsertPresetBody>) -> Result<StatusCode, (StatusCode, String)> {
    state
        .lazy
        .router()
        .presets
        .upsert(&name, &body.expression)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_preset(State(state): State<InboundState>, Path(name): Path<String>) -> Result<StatusCode, (StatusCode, String)> {
    state
        .lazy
        .router()
        .presets
        .remove(&name)
        .map_err(|e| (StatusCode::NOT_FOUND, e.to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct SessionQuery {
    preset: Option<String>,
    #[serde(rename = "tag-filter")]
    tag_filter: Option<String>,
    tags: Option<String>,
    filter: Option<String>,
    paginate: Option<bool>,
    project: Option<String>,
    user: Option<String>,
    environment: Option<String>,
}

impl SessionQuery {
    /// Template placeholder values carried on the connect request (spec §9).
    fn context(&self) -> crate::config::template::SessionContext {
        crate::config::template::SessionContext {
            project: self.project.clone(),
            user: self.user.clone(),
            environment: self.environment.clone(),
        }
    }
}

/// Build the visibility the new session should have from the (mutually
/// exclusive) `/mcp` query parameters, spec §6.
fn resolve_visibility(query: &SessionQuery) -> Result<(Option<String>, Option<crate::filter::FilterQuery>), (StatusCode, String)> {
    let set_count = [query.preset.is_some(), query.tag_filter.is_some(), query.tags.is_some(), query.filter.is_some()]
        .into_iter()
        .filter(|b| *b)
        .count();
    if set_count > 1 {
        return Err((StatusCode::BAD_REQUEST, "preset, tag-filter, tags, and filter are mutually exclusive".to_string()));
    }

    if let Some(preset) = &query.preset {
        return Ok((Some(preset.clone()), None));
    }
    if let Some(expr) = &query.tag_filter {
        let parsed = crate::filter::dsl::parse(expr).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
        return Ok((None, Some(crate::filter::FilterQuery::Advanced(parsed))));
    }
    if let Some(csv) = &query.tags {
        if csv.trim().is_empty() {
            return Ok((None, None));
        }
        let mut names = Vec::new();
        for raw in csv.split(',') {
            let tag = raw.trim();
            if tag.is_empty() {
                continue;
            }
            if tag.chars().any(|c| c.is_whitespace()) {
                return Err((StatusCode::BAD_REQUEST, format!("tag '{}' contains whitespace", tag)));
            }
            names.push(crate::filter::FilterQuery::Tag { name: tag.to_lowercase(), required: true });
        }
        if names.is_empty() {
            return Ok((None, None));
        }
        return Ok((None, Some(crate::filter::FilterQuery::Or(names))));
    }
    if let Some(expr) = &query.filter {
        // Compatibility param: try the advanced DSL first, fall back to
        // simple comma-separated OR semantics.
        if let Ok(parsed) = crate::filter::dsl::parse(expr) {
            return Ok((None, Some(crate::filter::FilterQuery::Advanced(parsed))));
        }
        let fallback = SessionQuery {
            preset: None,
            tag_filter: None,
            tags: Some(expr.clone()),
            filter: None,
            paginate: None,
            project: None,
            user: None,
            environment: None,
        };
        return resolve_visibility(&fallback);
    }
    Ok((None, None))
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

async fn mcp_post(
    State(state): State<InboundState>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<axum::response::Response, (StatusCode, String)> {
    let router = state.lazy.router();
    let existing = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()).map(|s| s.to_string());
    let now = now_ms();

    let (session_id, is_new) = match &existing {
        Some(id) if router.sessions.get(id, now).is_some() => (id.clone(), false),
        _ => {
            let (preset, tag_query) = resolve_visibility(&query)?;
            if let Some(name) = &preset {
                if router.presets.get(name).is_none() {
                    return Err((StatusCode::BAD_REQUEST, format!("unknown preset '{}'", name)));
                }
            }
            let pagination_mode = if query.paginate.unwrap_or(true) { PaginationMode::Enabled } else { PaginationMode::Disabled };
            let id = uuid::Uuid::new_v4().to_string();
            router.create_session(id.clone(), preset, tag_query, pagination_mode, query.context(), now).await;
            (id, true)
        }
    };

    let responses = dispatch_body(&state, &session_id, body).await;

    let mut response = match responses {
        Some(value) => Json(value).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    };
    if is_new {
        if let Ok(value) = HeaderValue::from_str(&session_id) {
            response.headers_mut().insert(SESSION_HEADER, value);
        }
    }
    Ok(response)
}

/// Dispatch a single JSON-RPC request object or a batch array, returning
/// `None` when every message in the batch was a notification (no `id`) or
/// was actually a reply to a reverse fan-out call.
async fn dispatch_body(state: &InboundState, session_id: &str, body: serde_json::Value) -> Option<serde_json::Value> {
    if let Some(requests) = body.as_array() {
        let mut responses = Vec::new();
        for request in requests {
            if state.reverse_http.try_resolve(request) {
                continue;
            }
            if let Some(resp) = dispatch_one(state, session_id, request).await {
                responses.push(resp);
            }
        }
        return if responses.is_empty() { None } else { Some(serde_json::Value::Array(responses)) };
    }
    if state.reverse_http.try_resolve(&body) {
        return None;
    }
    dispatch_one(state, session_id, &body).await
}

async fn dispatch_one(state: &InboundState, session_id: &str, request: &serde_json::Value) -> Option<serde_json::Value> {
    let method = request.get("method")?.as_str()?.to_string();
    let params = request.get("params").cloned().unwrap_or(serde_json::Value::Null);
    let id = request.get("id").cloned();

    let id = id?; // notifications get no response

    let now = now_ms();
    match state.lazy.dispatch(session_id, &method, params, now).await {
        Ok(result) => Some(serde_json::json!({ "jsonrpc": "2.0", "id": id, "result": result })),
        Err(e) => Some(e.to_json_rpc_error(id)),
    }
}

async fn mcp_get(State(state): State<InboundState>, headers: HeaderMap) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    let session_id = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()).ok_or(StatusCode::BAD_REQUEST)?;
    if state.lazy.router().sessions.get(session_id, now_ms()).is_none() {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Sse::new(reverse_capable_events(&state, session_id.to_string())).keep_alive(KeepAlive::default()))
}

/// SSE stream for one session: the usual listChanged notifications plus any
/// server-initiated requests forwarded from an upstream through this
/// session's registered [`HttpClientCallback`]. The registration and push
/// channel live for exactly as long as the returned stream does.
fn reverse_capable_events(state: &InboundState, session_id: String) -> impl Stream<Item = Result<Event, Infallible>> {
    let (tx, rx) = mpsc::unbounded_channel::<serde_json::Value>();
    state.reverse_http.push_channels.insert(session_id.clone(), tx);
    state
        .lazy
        .router()
        .upstreams
        .reverse
        .register(session_id.clone(), Arc::new(HttpClientCallback { session_id: session_id.clone(), state: state.reverse_http.clone() }));

    let push_events = UnboundedReceiverStream::new(rx).map(|payload| Ok(Event::default().data(payload.to_string())));
    let combined: std::pin::Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>> =
        Box::pin(futures::stream::select(list_changed_events(state), push_events));

    let guard = SseGuard { session_id, reverse_http: state.reverse_http.clone(), reverse_hub: state.lazy.router().upstreams.reverse.clone() };
    with_guard(combined, guard)
}

struct SseGuard {
    session_id: String,
    reverse_http: Arc<HttpReverseState>,
    reverse_hub: Arc<crate::router::reverse::ReverseHub>,
}

impl Drop for SseGuard {
    fn drop(&mut self) {
        self.reverse_http.push_channels.remove(&self.session_id);
        self.reverse_hub.unregister(&self.session_id);
    }
}

/// Ties `guard`'s lifetime to the stream's: it is held in the `unfold`
/// state and dropped only once the stream itself is dropped or exhausted.
fn with_guard<S>(stream: S, guard: SseGuard) -> impl Stream<Item = S::Item>
where
    S: Stream + Unpin,
{
    futures::stream::unfold((stream, guard), |(mut stream, guard)| async move {
        let item = StreamExt::next(&mut stream).await?;
        Some((item, (stream, guard)))
    })
}

async fn mcp_delete(State(state): State<InboundState>, headers: HeaderMap) -> StatusCode {
    match headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()) {
        Some(id) => {
            state.lazy.router().sessions.remove(id);
            StatusCode::OK
        }
        None => StatusCode::BAD_REQUEST,
    }
}

fn list_changed_events(state: &InboundState) -> impl Stream<Item = Result<Event, Infallible>> {
    let rx = state.lazy.router().notifier.subscribe();
    BroadcastStream::new(rx).filter_map(|kind| {
        let kind = kind.ok()?;
        let method = match kind {
            crate::router::notify::ListChangedKind::Tools => "notifications/tools/list_changed",
            crate::router::notify::ListChangedKind::Resources => "notifications/resources/list_changed",
            crate::router::notify::ListChangedKind::Prompts => "notifications/prompts/list_changed",
        };
        let payload = serde_json::json!({ "jsonrpc": "2.0", "method": method });
        Some(Ok(Event::default().data(payload.to_string())))
    })
}

// ---------------------------------------------------------------------------
// Legacy SSE mode (spec §6: "`/sse` + `/messages?sessionId=…`, deprecated").
// ---------------------------------------------------------------------------

async fn sse_stream(State(state): State<InboundState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session_id = uuid::Uuid::new_v4().to_string();
    state
        .lazy
        .router()
        .create_session(session_id.clone(), None, None, PaginationMode::Enabled, crate::config::template::SessionContext::default(), now_ms())
        .await;

    let endpoint_event = Event::default().event("endpoint").data(format!("/messages?sessionId={}", session_id));
    let rest = list_changed_events(&state);
    let stream = tokio_stream::once(Ok(endpoint_event)).chain(rest);
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn messages_post(
    State(state): State<InboundState>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<serde_json::Value>,
) -> Result<axum::response::Response, StatusCode> {
    let session_id = query.get("sessionId").ok_or(StatusCode::BAD_REQUEST)?;
    if state.lazy.router().sessions.get(session_id, now_ms()).is_none() {
        return Err(StatusCode::NOT_FOUND);
    }
    let response = dispatch_body(&state, session_id, body).await;
    Ok(match response {
        Some(value) => Json(value).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(preset: Option<&str>, tag_filter: Option<&str>, tags: Option<&str>, filter: Option<&str>) -> SessionQuery {
        SessionQuery {
            preset: preset.map(String::from),
            tag_filter: tag_filter.map(String::from),
            tags: tags.map(String::from),
            filter: filter.map(String::from),
            paginate: None,
            project: None,
            user: None,
            environment: None,
        }
    }

    #[test]
    fn no_params_means_no_filter() {
        let (preset, filter) = resolve_visibility(&query(None, None, None, None)).unwrap();
        assert!(preset.is_none());
        assert!(filter.is_none());
    }

    #[test]
    fn preset_and_tags_together_are_rejected() {
        let err = resolve_visibility(&query(Some("prod"), None, Some("a,b"), None)).unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn empty_tags_string_is_treated_as_no_filter() {
        let (preset, filter) = resolve_visibility(&query(None, None, Some(""), None)).unwrap();
        assert!(preset.is_none());
        assert!(filter.is_none());
    }

    #[test]
    fn tag_with_embedded_space_is_rejected() {
        let err = resolve_visibility(&query(None, None, Some("prod, internal tool"), None)).unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn csv_tags_become_an_or_of_required_tags() {
        let (preset, filter) = resolve_visibility(&query(None, None, Some("prod,staging"), None)).unwrap();
        assert!(preset.is_none());
        match filter.unwrap() {
            crate::filter::FilterQuery::Or(names) => assert_eq!(names.len(), 2),
            other => panic!("expected Or, got {:?}", other),
        }
    }

    #[test]
    fn tag_filter_param_parses_the_dsl() {
        let (preset, filter) = resolve_visibility(&query(None, Some("prod and not internal"), None, None)).unwrap();
        assert!(preset.is_none());
        assert!(matches!(filter.unwrap(), crate::filter::FilterQuery::Advanced(_)));
    }

    #[test]
    fn filter_param_falls_back_to_csv_when_not_valid_dsl() {
        let (preset, filter) = resolve_visibility(&query(None, None, None, Some("prod,staging"))).unwrap();
        assert!(preset.is_none());
        assert!(matches!(filter.unwrap(), crate::filter::FilterQuery::Or(_)));
    }

    #[test]
    fn preset_param_defers_visibility_to_the_named_preset() {
        let (preset, filter) = resolve_visibility(&query(Some("prod-only"), None, None, None)).unwrap();
        assert_eq!(preset.as_deref(), Some("prod-only"));
        assert!(filter.is_none());
    }
}
