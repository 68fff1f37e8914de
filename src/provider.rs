//! Model provider seam
//!
//! The agent loop is provider-agnostic: anything that can turn a
//! conversation plus a tool list into a [`StreamChunk`] stream can drive it.
//! Request/response formats of concrete vendors live in the implementations,
//! not here.

use crate::tools::ToolSpec;
use crate::types::{Message, StreamChunk};
use crate::Result;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Boxed chunk stream shared by providers, the agent loop and the SSE decoder.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// Cooperative cancellation handle, owned by the host.
///
/// Every layer observes the same token: the loop checks it at each
/// suspension point, and the completion wrapper reads it to decide whether a
/// run was aborted.
pub type AbortSignal = tokio_util::sync::CancellationToken;

/// Sampling options forwarded verbatim to the provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// A streaming language model.
///
/// One call to [`stream`](LlmProvider::stream) is one model turn. The
/// returned stream yields `text` and `tool_call` chunks and finishes with a
/// `done` chunk; an `Err` item aborts the turn and propagates to the caller
/// of the agent loop.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn stream(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        options: &ProviderOptions,
    ) -> Result<ChunkStream>;
}
