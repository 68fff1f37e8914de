//! HTTP host: exposes the agent loop as an SSE endpoint.
//!
//! Routes:
//!
//! - `POST /api/agent/chat` with `{"message": "...", "sessionId": "...", "stream": true}`.
//!   Streams SSE records (session id in the `x-session-id` header), or with
//!   `"stream": false` answers `{"sessionId": "...", "result": CompletionResult}`.
//! - `GET /health` returns `{"status": "ok", "tools": N}`.
//!
//! A client that disconnects mid-stream cancels the request's abort signal,
//! which stops the loop at its next suspension point and still records the
//! partial turn in the session.

use crate::accumulator::{CompletionOptions, wrap_with_completion};
use crate::agent_loop::{AgentOptions, run_agent_loop};
use crate::config::ServerConfig;
use crate::hooks::Hooks;
use crate::provider::{AbortSignal, LlmProvider};
use crate::registry::ToolRegistry;
use crate::session::SessionStore;
use crate::sse::{SSE_HEADERS, accumulate_stream, encode_sse};
use crate::types::{CompletionResult, Message, StreamChunk};
use crate::{Error, Result};
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio_util::sync::DropGuard;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const SESSION_HEADER: &str = "x-session-id";

/// Shared state behind every route.
#[derive(Clone)]
pub struct AppState {
    registry: Arc<ToolRegistry>,
    provider: Arc<dyn LlmProvider>,
    sessions: SessionStore,
    hooks: Hooks,
    max_iterations: usize,
}

impl AppState {
    pub fn new(
        registry: Arc<ToolRegistry>,
        provider: Arc<dyn LlmProvider>,
        config: &ServerConfig,
    ) -> Self {
        Self {
            registry,
            provider,
            sessions: SessionStore::new(
                config.system_prompt.clone(),
                config.history_limit,
                config.max_sessions,
            ),
            hooks: Hooks::default(),
            max_iterations: config.max_iterations,
        }
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("registry", &self.registry)
            .field("sessions", &self.sessions.len())
            .field("hooks", &self.hooks)
            .field("max_iterations", &self.max_iterations)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    #[serde(default = "default_stream")]
    pub stream: bool,
}

fn default_stream() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub session_id: Uuid,
    pub result: CompletionResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub tools: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/agent/chat", post(chat))
        .with_state(state)
}

/// Bind `config.socket_addr()` and serve until the process exits.
pub async fn serve(config: &ServerConfig, state: AppState) -> Result<()> {
    let address = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|e| Error::config(format!("could not bind {address}: {e}")))?;

    info!(
        event_name = "server.start",
        bind_address = %address,
        tools = state.registry.len(),
        "agent runtime listening"
    );

    axum::serve(listener, router(state)).await.map_err(|e| {
        error!(event_name = "server.error", error = %e, "server terminated unexpectedly");
        Error::other(format!("server terminated: {e}"))
    })
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        tools: state.registry.len(),
    })
}

pub async fn chat(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> Response {
    if request.message.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "message must not be empty", None);
    }

    let session_id = state.sessions.resolve(request.session_id);
    let user = Message::user(request.message);
    let mut messages = state.sessions.history(session_id);
    messages.push(user.clone());

    info!(
        event_name = "server.chat.request",
        session_id = %session_id,
        stream = request.stream,
        history = messages.len() - 1,
    );

    let abort = AbortSignal::new();
    let options = match AgentOptions::builder()
        .max_iterations(state.max_iterations)
        .hooks(state.hooks.clone())
        .abort_signal(abort.clone())
        .build()
    {
        Ok(options) => options,
        Err(e) => {
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string(), Some(session_id));
        }
    };

    let chunks = run_agent_loop(&messages, state.registry.clone(), state.provider.clone(), options);

    if !request.stream {
        return match accumulate_stream(chunks).await {
            Ok(result) => {
                state.sessions.record_turn(session_id, user, &result);
                Json(ChatResponse { session_id, result }).into_response()
            }
            Err(e) => {
                warn!(event_name = "server.chat.failed", session_id = %session_id, error = %e);
                error_response(StatusCode::BAD_GATEWAY, &e.to_string(), Some(session_id))
            }
        };
    }

    let sessions = state.sessions.clone();
    let completed = wrap_with_completion(
        chunks,
        CompletionOptions::new()
            .abort_signal(abort.clone())
            .on_complete(move |result| {
                info!(
                    event_name = "server.chat.completed",
                    session_id = %session_id,
                    aborted = result.aborted,
                    finish_reason = %result.finish_reason,
                    input_tokens = result.usage.input_tokens,
                    output_tokens = result.usage.output_tokens,
                );
                sessions.record_turn(session_id, user, &result);
                Ok(())
            }),
    );

    let body = Body::from_stream(encode_sse(CancelOnDisconnect::new(completed, abort)).map(Ok::<_, Infallible>));
    let mut response = body.into_response();
    let headers = response.headers_mut();
    for (name, value) in SSE_HEADERS {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    if let Ok(value) = HeaderValue::from_str(&session_id.to_string()) {
        headers.insert(HeaderName::from_static(SESSION_HEADER), value);
    }
    response
}

fn error_response(status: StatusCode, message: &str, session_id: Option<Uuid>) -> Response {
    let mut body = json!({ "error": message });
    if let Some(id) = session_id {
        body["sessionId"] = json!(id);
    }
    (status, Json(body)).into_response()
}

/// Cancels the abort signal when the response body is dropped before the
/// inner stream ends, i.e. when the client went away.
///
/// The token fires before `inner` is dropped, so a completion wrapper
/// inside observes the abort when its own drop guard runs.
struct CancelOnDisconnect<S> {
    guard: Option<DropGuard>,
    inner: S,
}

impl<S> CancelOnDisconnect<S> {
    fn new(inner: S, abort: AbortSignal) -> Self {
        Self {
            guard: Some(abort.drop_guard()),
            inner,
        }
    }
}

impl<S> Stream for CancelOnDisconnect<S>
where
    S: Stream<Item = Result<StreamChunk>> + Unpin,
{
    type Item = Result<StreamChunk>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_next(cx);
        if let Poll::Ready(None) = polled {
            if let Some(guard) = this.guard.take() {
                guard.disarm();
            }
        }
        polled
    }
}

impl<S> Drop for CancelOnDisconnect<S> {
    fn drop(&mut self) {
        if let Some(guard) = self.guard.take() {
            info!(event_name = "server.chat.client_disconnected");
            drop(guard);
        }
    }
}
