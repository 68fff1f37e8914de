//! Tool lifecycle observers
//!
//! Hooks let a host watch tool activity inside the agent loop without
//! touching the loop itself: audit logging, metrics, progress indicators.
//!
//! Two interception points exist:
//!
//! 1. **Tool start**: fired after the abort check and right before the
//!    registry runs the call.
//! 2. **Tool end**: fired with the [`ToolExecutionResult`] once the call
//!    finishes, successful or not.
//!
//! Hooks are observers. They cannot block, rewrite or skip a call; every
//! registered handler runs, in registration order, and the loop awaits each
//! one before moving on. Handlers that panic are isolated and logged so a
//! faulty observer never takes the loop down.
//!
//! # Example
//!
//! ```rust
//! use agent_runtime::Hooks;
//!
//! let hooks = Hooks::new()
//!     .add_tool_start(|event| async move {
//!         println!("[{}] calling {}", event.iteration, event.call.name);
//!     })
//!     .add_tool_end(|event| async move {
//!         println!("{} succeeded: {}", event.call.name, event.outcome.is_success());
//!     });
//! ```

use crate::registry::{ToolExecutionResult, panic_message};
use crate::types::ToolCall;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

/// Fired before a tool call executes.
#[derive(Debug, Clone)]
pub struct ToolStartEvent {
    pub call: ToolCall,
    /// Zero-based loop iteration that produced the call.
    pub iteration: usize,
}

/// Fired after a tool call completes.
#[derive(Debug, Clone)]
pub struct ToolEndEvent {
    pub call: ToolCall,
    pub outcome: ToolExecutionResult,
    pub iteration: usize,
}

pub type ToolStartHandler =
    Arc<dyn Fn(ToolStartEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub type ToolEndHandler =
    Arc<dyn Fn(ToolEndEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Registered tool lifecycle observers.
///
/// Cheap to clone; handlers are `Arc`-wrapped and shared.
#[derive(Clone, Default)]
pub struct Hooks {
    pub tool_start: Vec<ToolStartHandler>,
    pub tool_end: Vec<ToolEndHandler>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool-start observer.
    pub fn add_tool_start<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(ToolStartEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.tool_start
            .push(Arc::new(move |event| Box::pin(handler(event))));
        self
    }

    /// Register a tool-end observer.
    pub fn add_tool_end<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(ToolEndEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.tool_end
            .push(Arc::new(move |event| Box::pin(handler(event))));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tool_start.is_empty() && self.tool_end.is_empty()
    }

    pub async fn fire_tool_start(&self, event: ToolStartEvent) {
        for handler in &self.tool_start {
            let fut = AssertUnwindSafe(async { handler(event.clone()).await });
            if let Err(panic) = fut.catch_unwind().await {
                tracing::error!(
                    event_name = "agent.hook.panicked",
                    hook = HOOK_TOOL_START,
                    tool = %event.call.name,
                    error = %panic_message(panic.as_ref()),
                );
            }
        }
    }

    pub async fn fire_tool_end(&self, event: ToolEndEvent) {
        for handler in &self.tool_end {
            let fut = AssertUnwindSafe(async { handler(event.clone()).await });
            if let Err(panic) = fut.catch_unwind().await {
                tracing::error!(
                    event_name = "agent.hook.panicked",
                    hook = HOOK_TOOL_END,
                    tool = %event.call.name,
                    error = %panic_message(panic.as_ref()),
                );
            }
        }
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("tool_start", &format!("{} handlers", self.tool_start.len()))
            .field("tool_end", &format!("{} handlers", self.tool_end.len()))
            .finish()
    }
}

pub const HOOK_TOOL_START: &str = "tool_start";

pub const HOOK_TOOL_END: &str = "tool_end";
