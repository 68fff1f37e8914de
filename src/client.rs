//! Client for a running agent runtime
//!
//! [`AgentClient`] talks to the HTTP host in [`server`](crate::server): it
//! posts a user message, decodes the SSE response back into
//! [`StreamChunk`]s and keeps track of the session id the server assigned.
//!
//! ```rust,no_run
//! use agent_runtime::{AgentClient, StreamChunk};
//! use futures::StreamExt;
//!
//! # async fn example() -> agent_runtime::Result<()> {
//! let client = AgentClient::from_env()?;
//! let mut stream = client.stream("What is 2 + 3?", None).await?;
//! let session = stream.session_id();
//!
//! while let Some(chunk) = stream.next().await {
//!     match chunk? {
//!         StreamChunk::Text { delta } => print!("{}", delta),
//!         StreamChunk::ToolError { error, .. } => eprintln!("tool failed: {}", error),
//!         _ => {}
//!     }
//! }
//!
//! // Continue the same conversation
//! let reply = client.complete("And times 4?", session).await?;
//! println!("{}", reply.result.text);
//! # Ok(())
//! # }
//! ```
//!
//! ## Interrupting
//!
//! [`ChatStream::abort_handle`] returns a token that can be cancelled from
//! any task. The stream then ends at its next poll and the connection is
//! dropped, which in turn cancels the run on the server.

use crate::config::get_server_url;
use crate::provider::{AbortSignal, ChunkStream};
use crate::retry::{RetryConfig, is_connect_error, retry_with_backoff, retry_with_backoff_when};
use crate::server::{ChatRequest, ChatResponse, HealthResponse, SESSION_HEADER};
use crate::sse::decode_sse;
use crate::types::StreamChunk;
use crate::{Error, Result};
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio_util::sync::WaitForCancellationFutureOwned;
use tracing::debug;
use uuid::Uuid;

const CHAT_PATH: &str = "/api/agent/chat";
const HEALTH_PATH: &str = "/health";

/// HTTP client for the agent runtime.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct AgentClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryConfig,
}

impl AgentClient {
    /// Create a client for the runtime at `base_url`.
    ///
    /// Only connection establishment has a timeout: a streaming answer may
    /// legitimately take minutes while tools run.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::config(format!(
                "base_url must start with http:// or https://, got `{}`",
                base_url
            )));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry: RetryConfig::default(),
        })
    }

    /// Create a client for the URL resolved by [`get_server_url`].
    pub fn from_env() -> Result<Self> {
        Self::new(get_server_url(None))
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send `message` and stream the agent's output.
    pub async fn stream(&self, message: &str, session_id: Option<Uuid>) -> Result<ChatStream> {
        let request = ChatRequest {
            message: message.to_string(),
            session_id,
            stream: true,
        };
        let response = self.post_chat(&request).await?;

        let session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        debug!(event_name = "client.stream.opened", session_id = ?session_id);

        Ok(ChatStream::new(session_id, decode_sse(response.bytes_stream())))
    }

    /// Send `message` and wait for the folded result.
    pub async fn complete(&self, message: &str, session_id: Option<Uuid>) -> Result<ChatResponse> {
        let request = ChatRequest {
            message: message.to_string(),
            session_id,
            stream: false,
        };
        let response = self.post_chat(&request).await?;
        Ok(response.json().await?)
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let url = format!("{}{}", self.base_url, HEALTH_PATH);
        let http = &self.http;
        let url = url.as_str();

        let response = retry_with_backoff(&self.retry, || async move {
            check_status(http.get(url).send().await?).await
        })
        .await?;
        Ok(response.json().await?)
    }

    /// POST a chat turn. Only connection failures are retried: once the
    /// server has answered, the turn may already have run tools.
    async fn post_chat(&self, request: &ChatRequest) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, CHAT_PATH);
        let http = &self.http;
        let url = url.as_str();

        retry_with_backoff_when(&self.retry, is_connect_error, || async move {
            check_status(http.post(url).json(request).send().await?).await
        })
        .await
    }
}

/// Turn non-success statuses into [`Error::Api`] as `"<status> <body>"`.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(Error::api(format!("{} {}", status.as_u16(), body.trim())))
}

/// Decoded chunk stream of one chat request.
pub struct ChatStream {
    session_id: Option<Uuid>,
    chunks: ChunkStream,
    abort: AbortSignal,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
}

impl ChatStream {
    fn new(session_id: Option<Uuid>, chunks: ChunkStream) -> Self {
        let abort = AbortSignal::new();
        Self {
            session_id,
            chunks,
            cancelled: Box::pin(abort.clone().cancelled_owned()),
            abort,
        }
    }

    /// Session the server filed this turn under.
    pub fn session_id(&self) -> Option<Uuid> {
        self.session_id
    }

    /// Token that ends this stream when cancelled.
    pub fn abort_handle(&self) -> AbortSignal {
        self.abort.clone()
    }
}

impl std::fmt::Debug for ChatStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStream")
            .field("session_id", &self.session_id)
            .field("aborted", &self.abort.is_cancelled())
            .finish()
    }
}

impl Stream for ChatStream {
    type Item = Result<StreamChunk>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        // Registers the waker too, so a cancel ends a stream stuck waiting on the server
        if self.cancelled.as_mut().poll(cx).is_ready() {
            return Poll::Ready(None);
        }
        self.chunks.as_mut().poll_next(cx)
    }
}
