//! # Agent Runtime
//!
//! A streaming agent execution runtime: a tool registry, an iterative
//! model/tool loop, a completion accumulator and an SSE transport, plus an
//! HTTP host and client built on top of them.
//!
//! ## Overview
//!
//! A run starts from a conversation and a set of tools. The loop streams the
//! model's answer, executes every tool call the model requests, feeds the
//! results back and repeats until the model stops calling tools, an
//! iteration cap is hit or the caller aborts. Everything it produces is a
//! [`StreamChunk`]:
//!
//! - `text` deltas from the model
//! - `tool_call` requests
//! - `tool_result` / `tool_error` outcomes of executed tools
//! - `done` markers with finish reason and token usage
//!
//! Tool failures never end a run. Unknown tools, invalid arguments, handler
//! errors and handler panics all come back as `tool_error` chunks and are fed
//! to the model on the next turn.
//!
//! ## Running the loop
//!
//! ```rust,no_run
//! use agent_runtime::{
//!     run_agent_loop, tool, AgentOptions, LlmProvider, Message, StreamChunk, ToolRegistry,
//! };
//! use futures::StreamExt;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example(provider: Arc<dyn LlmProvider>) -> agent_runtime::Result<()> {
//! let add = tool("add", "Add two numbers")
//!     .param("a", "number")
//!     .param("b", "number")
//!     .build(|args| async move {
//!         let a = args["a"].as_f64().unwrap_or(0.0);
//!         let b = args["b"].as_f64().unwrap_or(0.0);
//!         Ok(json!(a + b))
//!     });
//!
//! let registry = Arc::new(ToolRegistry::new().with_tool(add));
//! let options = AgentOptions::builder().max_iterations(5).build()?;
//! let messages = vec![Message::user("What is 2 + 3?")];
//!
//! let mut stream = run_agent_loop(&messages, registry, provider, options);
//! while let Some(chunk) = stream.next().await {
//!     if let StreamChunk::Text { delta } = chunk? {
//!         print!("{}", delta);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Serving over HTTP
//!
//! ```rust,no_run
//! use agent_runtime::server::{serve, AppState};
//! use agent_runtime::{init_logging, LlmProvider, ServerConfig, ToolRegistry};
//! use std::sync::Arc;
//!
//! # async fn example(provider: Arc<dyn LlmProvider>) -> agent_runtime::Result<()> {
//! let config = ServerConfig::from_env()?;
//! init_logging(&config.logging)?;
//!
//! let state = AppState::new(Arc::new(ToolRegistry::new()), provider, &config);
//! serve(&config, state).await
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **registry**: named tools, argument validation and fault-isolated execution
//! - **agent_loop**: the model/tool iteration producing a chunk stream
//! - **accumulator**: folds a chunk stream into a [`CompletionResult`] exactly once
//! - **sse**: SSE encoding and decoding of chunk streams
//! - **server** / **client**: the HTTP host and its client
//! - **provider**: the model provider seam, with a scripted [`mock::MockProvider`]
//! - **tools**, **hooks**, **session**, **context**, **retry**, **config**, **error**: supporting pieces

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

mod accumulator;
mod agent_loop;
mod client;
mod config;
mod context;
mod error;
mod hooks;
mod provider;
mod registry;
mod session;
mod sse;
mod tools;
mod types;

// ============================================================================
// PUBLIC MODULES
// ============================================================================

/// Scripted provider for tests and demos.
pub mod mock;

/// Exponential backoff with jitter, used by the client when connecting.
pub mod retry;

/// Axum router, request/response types and the `serve` entry point.
pub mod server;

// ============================================================================
// PUBLIC EXPORTS
// ============================================================================

// --- Tool System ---

pub use registry::{ToolExecutionResult, ToolRegistry};
pub use tools::{
    ParameterValidator, SchemaValidator, Tool, ToolBuilder, ToolHandler, ToolSpec, TypedValidator,
    tool,
};

// --- Agent Loop ---

pub use agent_loop::{AgentOptions, AgentOptionsBuilder, DEFAULT_MAX_ITERATIONS, run_agent_loop};
pub use provider::{AbortSignal, ChunkStream, LlmProvider, ProviderOptions};

// --- Completion & Streaming ---

pub use accumulator::{
    CompletionCallback, CompletionFold, CompletionOptions, CompletionStream, wrap_with_completion,
};
pub use sse::{
    SSE_DONE, SSE_HEADERS, SseRecord, accumulate_stream, decode_sse, encode_sse,
    format_sse_record, parse_sse_record,
};

// --- Lifecycle Hooks ---

pub use hooks::{
    HOOK_TOOL_END, HOOK_TOOL_START, Hooks, ToolEndEvent, ToolEndHandler, ToolStartEvent,
    ToolStartHandler,
};

// --- Client, Sessions & Configuration ---

pub use client::{AgentClient, ChatStream};
pub use config::{
    DEFAULT_SERVER_URL, LogConfig, LogFormat, ServerConfig, get_server_url, init_logging,
    server_url_from_lookup,
};
pub use session::SessionStore;

// --- Context Management ---

pub use context::{estimate_tokens, is_approaching_limit, truncate_messages};

// --- Error Handling ---

pub use error::{Error, Result};

// --- Core Types ---

pub use types::{
    CompletionResult, ContentPart, FINISH_REASON_ABORT, FINISH_REASON_STOP, ImageUrl, Message,
    MessageContent, MessageRole, StreamChunk, ToolCall, ToolResultRecord, Usage,
};

// ============================================================================
// CONVENIENCE PRELUDE
// ============================================================================

/// The items most programs need: `use agent_runtime::prelude::*;`
pub mod prelude {
    pub use crate::{
        AgentClient, AgentOptions, CompletionOptions, CompletionResult, Error, Hooks,
        LlmProvider, Message, Result, StreamChunk, Tool, ToolRegistry, run_agent_loop, tool,
        wrap_with_completion,
    };
}
