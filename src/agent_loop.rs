//! # Agent loop
//!
//! Drives a multi-turn, tool-calling conversation against a streaming
//! provider and exposes it as one [`ChunkStream`].
//!
//! Each iteration is one model turn:
//!
//! 1. Stop silently if the abort signal fired.
//! 2. Ask the provider to stream a reply, advertising the registry's tools.
//! 3. Forward every chunk unchanged while collecting text and tool calls.
//! 4. Append one assistant message: plain text, or text plus one `tool_use`
//!    part per call in arrival order.
//! 5. No tool calls means the model is done.
//! 6. Otherwise run the calls one at a time through the registry, append a
//!    `tool` message for each and emit `tool_result` / `tool_error`.
//!
//! The loop stops on the first of: a turn without tool calls, the iteration
//! cap, or the abort signal. Provider failures are yielded as `Err` and end
//! the stream; tool failures never do, they become `tool_error` chunks the
//! model can react to.
//!
//! The caller's messages are copied on entry. Each invocation owns its own
//! conversation, so concurrent loops can share one registry and provider.
//!
//! ```rust,no_run
//! use agent_runtime::{run_agent_loop, AgentOptions, LlmProvider, Message, StreamChunk, ToolRegistry};
//! use futures::StreamExt;
//! use std::sync::Arc;
//!
//! # async fn example(provider: Arc<dyn LlmProvider>, registry: Arc<ToolRegistry>) -> agent_runtime::Result<()> {
//! let options = AgentOptions::builder().max_iterations(5).build()?;
//! let mut stream = run_agent_loop(&[Message::user("What is 2 + 3?")], registry, provider, options);
//!
//! while let Some(chunk) = stream.next().await {
//!     if let StreamChunk::Text { delta } = chunk? {
//!         print!("{}", delta);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use crate::hooks::{Hooks, ToolEndEvent, ToolStartEvent};
use crate::provider::{AbortSignal, ChunkStream, LlmProvider, ProviderOptions};
use crate::registry::{ToolExecutionResult, ToolRegistry};
use crate::types::{ContentPart, Message, StreamChunk, ToolCall};
use crate::{Error, Result};
use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Iteration cap applied when none is configured.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Per-invocation settings for [`run_agent_loop`].
#[derive(Debug, Clone)]
pub struct AgentOptions {
    max_iterations: usize,
    provider_options: ProviderOptions,
    hooks: Hooks,
    abort_signal: Option<AbortSignal>,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            provider_options: ProviderOptions::default(),
            hooks: Hooks::default(),
            abort_signal: None,
        }
    }
}

impl AgentOptions {
    pub fn builder() -> AgentOptionsBuilder {
        AgentOptionsBuilder::default()
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn provider_options(&self) -> &ProviderOptions {
        &self.provider_options
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub fn abort_signal(&self) -> Option<&AbortSignal> {
        self.abort_signal.as_ref()
    }
}

/// Builder for [`AgentOptions`]
#[derive(Debug, Default)]
pub struct AgentOptionsBuilder {
    max_iterations: Option<usize>,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    hooks: Hooks,
    abort_signal: Option<AbortSignal>,
}

impl AgentOptionsBuilder {
    /// Upper bound on model turns. Must be at least 1.
    pub fn max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = Some(max);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn abort_signal(mut self, signal: AbortSignal) -> Self {
        self.abort_signal = Some(signal);
        self
    }

    pub fn build(self) -> Result<AgentOptions> {
        let max_iterations = self.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS);
        if max_iterations == 0 {
            return Err(Error::config("max_iterations must be at least 1"));
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(Error::config("temperature must be between 0.0 and 2.0"));
            }
        }

        Ok(AgentOptions {
            max_iterations,
            provider_options: ProviderOptions {
                model: self.model,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            },
            hooks: self.hooks,
            abort_signal: self.abort_signal,
        })
    }
}

/// Run the agent loop and stream its output.
///
/// The returned stream is lazy: nothing happens until it is polled, and
/// dropping it stops the loop at its current suspension point.
pub fn run_agent_loop(
    messages: &[Message],
    registry: Arc<ToolRegistry>,
    provider: Arc<dyn LlmProvider>,
    options: AgentOptions,
) -> ChunkStream {
    let mut conversation = messages.to_vec();
    // A token nobody holds never fires, so the no-signal case needs no branching below
    let abort = options.abort_signal.clone().unwrap_or_default();

    Box::pin(async_stream::stream! {
        info!(
            event_name = "agent.loop.started",
            messages = conversation.len(),
            tools = registry.len(),
            max_iterations = options.max_iterations,
        );

        for iteration in 0..options.max_iterations {
            if abort.is_cancelled() {
                debug!(event_name = "agent.loop.aborted", iteration, stage = "iteration");
                return;
            }

            let tools = registry.specs_for_llm();
            let opened = until_aborted(
                &abort,
                provider.stream(&conversation, &tools, &options.provider_options),
            )
            .await;

            let mut chunks = match opened {
                None => {
                    debug!(event_name = "agent.loop.aborted", iteration, stage = "connect");
                    return;
                }
                Some(Ok(chunks)) => chunks,
                Some(Err(e)) => {
                    warn!(event_name = "agent.loop.provider_failed", iteration, error = %e);
                    yield Err(e);
                    return;
                }
            };

            let mut text = String::new();
            let mut tool_calls: Vec<ToolCall> = Vec::new();
            let mut reported_tool_calls = false;

            loop {
                let Some(next) = until_aborted(&abort, chunks.next()).await else {
                    debug!(event_name = "agent.loop.aborted", iteration, stage = "stream");
                    return;
                };
                let Some(item) = next else { break };

                let chunk = match item {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!(event_name = "agent.loop.provider_failed", iteration, error = %e);
                        yield Err(e);
                        return;
                    }
                };

                match &chunk {
                    StreamChunk::Text { delta } => text.push_str(delta),
                    StreamChunk::ToolCall { call } => tool_calls.push(call.clone()),
                    StreamChunk::Done { has_tool_calls, .. } => reported_tool_calls = *has_tool_calls,
                    StreamChunk::ToolResult { .. } | StreamChunk::ToolError { .. } => {}
                }

                yield Ok(chunk);
            }

            if reported_tool_calls != !tool_calls.is_empty() {
                warn!(
                    event_name = "agent.loop.tool_call_mismatch",
                    iteration,
                    reported = reported_tool_calls,
                    collected = tool_calls.len(),
                );
            }

            conversation.push(assistant_message(text, &tool_calls));

            if tool_calls.is_empty() {
                info!(event_name = "agent.loop.finished", iteration, reason = "no_tool_calls");
                return;
            }

            for call in tool_calls {
                if abort.is_cancelled() {
                    debug!(event_name = "agent.loop.aborted", iteration, stage = "tool", call_id = %call.id);
                    return;
                }

                let started = options
                    .hooks
                    .fire_tool_start(ToolStartEvent { call: call.clone(), iteration });
                if until_aborted(&abort, started).await.is_none() {
                    debug!(event_name = "agent.loop.aborted", iteration, stage = "tool_start_hook", call_id = %call.id);
                    return;
                }

                let Some(outcome) = until_aborted(
                    &abort,
                    registry.execute(&call.name, call.arguments.clone()),
                )
                .await
                else {
                    debug!(event_name = "agent.loop.aborted", iteration, stage = "tool", call_id = %call.id);
                    return;
                };

                debug!(
                    event_name = "agent.loop.tool_finished",
                    iteration,
                    tool = %call.name,
                    call_id = %call.id,
                    success = outcome.is_success(),
                );

                let ended = options.hooks.fire_tool_end(ToolEndEvent {
                    call: call.clone(),
                    outcome: outcome.clone(),
                    iteration,
                });
                if until_aborted(&abort, ended).await.is_none() {
                    debug!(event_name = "agent.loop.aborted", iteration, stage = "tool_end_hook", call_id = %call.id);
                    return;
                }

                conversation.push(Message::tool(&call.id, &call.name, outcome.to_message_content()));

                yield Ok(match outcome {
                    ToolExecutionResult::Success(result) => StreamChunk::tool_result(call.id, result),
                    ToolExecutionResult::Failure(error) => StreamChunk::tool_error(call.id, error),
                });
            }
        }

        warn!(
            event_name = "agent.loop.max_iterations",
            max_iterations = options.max_iterations,
            "agent loop stopped at the iteration cap with tool calls still pending",
        );
    })
}

fn assistant_message(text: String, tool_calls: &[ToolCall]) -> Message {
    if tool_calls.is_empty() {
        return Message::assistant(text);
    }

    let mut parts = Vec::with_capacity(tool_calls.len() + 1);
    if !text.is_empty() {
        parts.push(ContentPart::text(text));
    }
    parts.extend(tool_calls.iter().map(ContentPart::tool_use));
    Message::assistant(parts)
}

/// Await `fut` unless the signal fires first. Cancellation wins ties.
async fn until_aborted<F: Future>(abort: &AbortSignal, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = abort.cancelled() => None,
        out = fut => Some(out),
    }
}
