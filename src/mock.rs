//! Scripted provider for tests.
//!
//! [`MockProvider`] replays queued model turns in order, one per call to
//! [`LlmProvider::stream`], and records what each call was given so tests
//! can assert on the conversation the agent loop built.
//!
//! ```rust
//! use agent_runtime::mock::MockProvider;
//! use agent_runtime::{StreamChunk, Usage};
//! use serde_json::json;
//!
//! let provider = MockProvider::new();
//! provider
//!     .queue_stream(vec![
//!         StreamChunk::tool_call("1", "add", json!({"a": 2, "b": 3})),
//!         StreamChunk::done("tool_calls", true, Usage::new(12, 8)),
//!     ])
//!     .queue_stream(vec![
//!         StreamChunk::text("5"),
//!         StreamChunk::done("stop", false, Usage::new(20, 1)),
//!     ]);
//! ```
//!
//! Errors are queued as strings because [`Error`](crate::Error) is not
//! `Clone`; they surface as [`Error::Provider`](crate::Error::Provider).

use crate::provider::{ChunkStream, LlmProvider, ProviderOptions};
use crate::tools::ToolSpec;
use crate::types::{Message, StreamChunk};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use tokio_stream::StreamExt;

/// What one recorded `stream` call received.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    pub options: ProviderOptions,
}

enum ScriptedTurn {
    Chunks(Vec<Result<StreamChunk>>),
    /// Yields the chunks, then never produces another item.
    Stalled(Vec<StreamChunk>),
    OpenError(String),
}

/// A queue-based provider for unit and integration tests.
#[derive(Default)]
pub struct MockProvider {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a turn that yields `chunks` and ends.
    pub fn queue_stream(&self, chunks: Vec<StreamChunk>) -> &Self {
        self.push(ScriptedTurn::Chunks(chunks.into_iter().map(Ok).collect()))
    }

    /// Enqueue a turn that yields `chunks`, then fails mid-stream.
    pub fn queue_failing_stream(&self, chunks: Vec<StreamChunk>, error: impl Into<String>) -> &Self {
        let mut items: Vec<Result<StreamChunk>> = chunks.into_iter().map(Ok).collect();
        items.push(Err(Error::provider(error)));
        self.push(ScriptedTurn::Chunks(items))
    }

    /// Enqueue a turn that yields `chunks` and then hangs until dropped.
    pub fn queue_stalled_stream(&self, chunks: Vec<StreamChunk>) -> &Self {
        self.push(ScriptedTurn::Stalled(chunks))
    }

    /// Enqueue a failure to open the stream at all.
    pub fn queue_open_error(&self, error: impl Into<String>) -> &Self {
        self.push(ScriptedTurn::OpenError(error.into()))
    }

    /// Every call made so far, in order.
    pub fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }

    /// Turns still waiting to be replayed.
    pub fn remaining(&self) -> usize {
        self.turns.lock().map(|t| t.len()).unwrap_or_default()
    }

    fn push(&self, turn: ScriptedTurn) -> &Self {
        if let Ok(mut turns) = self.turns.lock() {
            turns.push_back(turn);
        }
        self
    }
}

impl fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockProvider")
            .field("queued_turns", &self.remaining())
            .field("recorded_calls", &self.call_count())
            .finish()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn stream(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        options: &ProviderOptions,
    ) -> Result<ChunkStream> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                messages: messages.to_vec(),
                tools: tools.to_vec(),
                options: options.clone(),
            });
        }

        let turn = self.turns.lock().ok().and_then(|mut t| t.pop_front());
        match turn {
            Some(ScriptedTurn::Chunks(items)) => Ok(Box::pin(tokio_stream::iter(items))),
            Some(ScriptedTurn::Stalled(chunks)) => Ok(Box::pin(
                tokio_stream::iter(chunks.into_iter().map(Ok::<StreamChunk, Error>))
                    .chain(tokio_stream::pending()),
            )),
            Some(ScriptedTurn::OpenError(message)) => Err(Error::provider(message)),
            None => Err(Error::provider("MockProvider: no queued turns remaining")),
        }
    }
}
