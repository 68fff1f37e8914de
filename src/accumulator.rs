//! Exactly-once completion accounting for chunk streams.
//!
//! [`wrap_with_completion`] passes a stream through unchanged while folding
//! it into a [`CompletionResult`], and hands that result to an observer
//! exactly once no matter how the stream ends:
//!
//! | How it ends                        | `aborted` | `finish_reason`            |
//! |------------------------------------|-----------|----------------------------|
//! | inner stream exhausted             | `false`   | last `done`, else `"stop"` |
//! | inner stream yields `Err`          | `false`   | last `done`, else `"stop"` |
//! | abort signal fired                 | `true`    | `"abort"`                  |
//! | wrapper dropped before the end     | signal    | as above                   |
//!
//! Observer failures (returned errors and panics) are logged and swallowed;
//! they never reach the consumer of the stream.

use crate::provider::AbortSignal;
use crate::types::{
    CompletionResult, FINISH_REASON_ABORT, FINISH_REASON_STOP, StreamChunk, ToolCall,
    ToolResultRecord, Usage,
};
use crate::Result;
use futures::Stream;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tracing::{debug, error};

/// Observer invoked with the folded result.
pub type CompletionCallback = Box<dyn FnOnce(CompletionResult) -> anyhow::Result<()> + Send>;

/// Options for [`wrap_with_completion`].
#[derive(Default)]
pub struct CompletionOptions {
    on_complete: Option<CompletionCallback>,
    abort_signal: Option<AbortSignal>,
}

impl CompletionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(CompletionResult) -> anyhow::Result<()> + Send + 'static,
    {
        self.on_complete = Some(Box::new(callback));
        self
    }

    pub fn abort_signal(mut self, signal: AbortSignal) -> Self {
        self.abort_signal = Some(signal);
        self
    }
}

impl std::fmt::Debug for CompletionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionOptions")
            .field("on_complete", &self.on_complete.is_some())
            .field("abort_signal", &self.abort_signal)
            .finish()
    }
}

/// Incremental fold of [`StreamChunk`]s into a [`CompletionResult`].
#[derive(Debug, Clone, Default)]
pub struct CompletionFold {
    text: String,
    tool_calls: Vec<ToolCall>,
    tool_results: Vec<ToolResultRecord>,
    usage: Usage,
    finish_reason: Option<String>,
    call_names: HashMap<String, String>,
}

impl CompletionFold {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, chunk: &StreamChunk) {
        match chunk {
            StreamChunk::Text { delta } => self.text.push_str(delta),
            StreamChunk::ToolCall { call } => {
                self.call_names.insert(call.id.clone(), call.name.clone());
                self.tool_calls.push(call.clone());
            }
            StreamChunk::ToolResult { call_id, result } => {
                self.tool_results.push(ToolResultRecord {
                    call_id: call_id.clone(),
                    name: self.call_names.get(call_id).cloned(),
                    success: true,
                    result: Some(result.clone()),
                    error: None,
                });
            }
            StreamChunk::ToolError { call_id, error } => {
                self.tool_results.push(ToolResultRecord {
                    call_id: call_id.clone(),
                    name: self.call_names.get(call_id).cloned(),
                    success: false,
                    result: None,
                    error: Some(error.clone()),
                });
            }
            StreamChunk::Done {
                finish_reason,
                usage,
                ..
            } => {
                // Usage is per model turn; a multi-iteration run sums them
                self.usage += *usage;
                self.finish_reason = Some(finish_reason.clone());
            }
        }
    }

    pub fn finish(self, aborted: bool) -> CompletionResult {
        let finish_reason = if aborted {
            FINISH_REASON_ABORT.to_string()
        } else {
            self.finish_reason
                .unwrap_or_else(|| FINISH_REASON_STOP.to_string())
        };

        CompletionResult {
            text: self.text,
            tool_calls: self.tool_calls,
            tool_results: self.tool_results,
            usage: self.usage,
            finish_reason,
            aborted,
        }
    }
}

/// Stream adapter returned by [`wrap_with_completion`].
pub struct CompletionStream<S> {
    inner: S,
    fold: CompletionFold,
    on_complete: Option<CompletionCallback>,
    abort_signal: Option<AbortSignal>,
    finished: bool,
}

/// Wrap `stream` so its folded result reaches `options.on_complete` exactly once.
///
/// ```rust,no_run
/// use agent_runtime::{wrap_with_completion, ChunkStream, CompletionOptions};
/// use futures::StreamExt;
///
/// # async fn example(stream: ChunkStream) {
/// let mut wrapped = wrap_with_completion(
///     stream,
///     CompletionOptions::new().on_complete(|result| {
///         println!("{} tokens out", result.usage.output_tokens);
///         Ok(())
///     }),
/// );
/// while let Some(_chunk) = wrapped.next().await {}
/// # }
/// ```
pub fn wrap_with_completion<S>(stream: S, options: CompletionOptions) -> CompletionStream<S>
where
    S: Stream<Item = Result<StreamChunk>> + Unpin,
{
    CompletionStream {
        inner: stream,
        fold: CompletionFold::new(),
        on_complete: options.on_complete,
        abort_signal: options.abort_signal,
        finished: false,
    }
}

impl<S> CompletionStream<S> {
    fn is_aborted(&self) -> bool {
        self.abort_signal
            .as_ref()
            .is_some_and(|signal| signal.is_cancelled())
    }

    fn complete(&mut self) {
        self.finished = true;
        let Some(callback) = self.on_complete.take() else {
            return;
        };

        let aborted = self.is_aborted();
        let result = std::mem::take(&mut self.fold).finish(aborted);
        debug!(
            event_name = "agent.completion.fired",
            aborted,
            finish_reason = %result.finish_reason,
            tool_calls = result.tool_calls.len(),
        );

        match std::panic::catch_unwind(AssertUnwindSafe(move || callback(result))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(event_name = "agent.completion.callback_failed", error = %e);
            }
            Err(panic) => {
                error!(
                    event_name = "agent.completion.callback_panicked",
                    error = %crate::registry::panic_message(panic.as_ref()),
                );
            }
        }
    }
}

impl<S> Stream for CompletionStream<S>
where
    S: Stream<Item = Result<StreamChunk>> + Unpin,
{
    type Item = Result<StreamChunk>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        if this.is_aborted() {
            this.complete();
            return Poll::Ready(None);
        }

        match ready!(Pin::new(&mut this.inner).poll_next(cx)) {
            Some(Ok(chunk)) => {
                this.fold.apply(&chunk);
                Poll::Ready(Some(Ok(chunk)))
            }
            Some(Err(e)) => {
                this.complete();
                Poll::Ready(Some(Err(e)))
            }
            None => {
                this.complete();
                Poll::Ready(None)
            }
        }
    }
}

impl<S> Drop for CompletionStream<S> {
    fn drop(&mut self) {
        if !self.finished {
            debug!(event_name = "agent.completion.dropped_early");
            self.complete();
        }
    }
}
