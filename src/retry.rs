//! Connection retry with exponential backoff
//!
//! Used by [`AgentClient`](crate::client::AgentClient) against a runtime that
//! may be restarting or briefly overloaded. Chat requests are retried only
//! while no response exists ([`is_connect_error`]): any status the runtime
//! answers with, including 502 for a failed model, may follow tool calls
//! that already ran, so it is reported instead of replaying the turn.
//! Idempotent requests such as the health check also retry gateway
//! statuses ([`is_transient_error`]).
//!
//! ```rust,no_run
//! use agent_runtime::retry::{retry_with_backoff, RetryConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> agent_runtime::Result<()> {
//! let config = RetryConfig::default()
//!     .with_max_attempts(4)
//!     .with_initial_delay(Duration::from_millis(200));
//!
//! let status = retry_with_backoff(&config, || async {
//!     Ok::<_, agent_runtime::Error>(200u16)
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Backoff schedule
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first one. Never below 1.
    pub max_attempts: u32,

    pub initial_delay: Duration,

    pub max_delay: Duration,

    /// Growth factor applied per attempt (2.0 doubles the delay each time)
    pub backoff_multiplier: f64,

    /// Spread of random jitter around the computed delay, 0.0 to 1.0
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// A schedule that makes exactly one attempt.
    pub fn disabled() -> Self {
        Self::default().with_max_attempts(1)
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_jitter_factor(mut self, jitter: f64) -> Self {
        self.jitter_factor = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay before retry number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let exponential = base_ms * self.backoff_multiplier.powi(attempt as i32);
        let capped = exponential.min(self.max_delay.as_millis() as f64);

        let jitter_range = capped * self.jitter_factor;
        let jitter = rand::random::<f64>() * jitter_range - jitter_range / 2.0;

        Duration::from_millis((capped + jitter).max(0.0) as u64)
    }
}

/// Status codes that indicate the runtime is restarting or shedding load.
const TRANSIENT_STATUSES: [u16; 3] = [502, 503, 504];

/// Whether `error` is worth another connection attempt.
///
/// Transport failures and timeouts are transient, as are gateway statuses
/// carried by [`Error::Api`] (the client formats them as `"<status> <body>"`).
/// Everything else, including remote error records, is final.
pub fn is_transient_error(error: &Error) -> bool {
    match error {
        Error::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
        Error::Timeout => true,
        Error::Api(message) => api_status(message).is_some_and(|s| TRANSIENT_STATUSES.contains(&s)),
        _ => false,
    }
}

/// Leading status code of an [`Error::Api`] message, if present.
pub fn api_status(message: &str) -> Option<u16> {
    message.split_whitespace().next()?.parse().ok()
}

/// Whether the request failed before the server produced any response.
pub fn is_connect_error(error: &Error) -> bool {
    matches!(error, Error::Http(e) if e.is_connect() || e.is_timeout())
}

/// Run `operation`, retrying transient failures on the configured schedule.
///
/// Non-transient errors are returned immediately; after the last attempt the
/// final error is returned.
pub async fn retry_with_backoff<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_with_backoff_when(config, is_transient_error, operation).await
}

/// Like [`retry_with_backoff`], with `should_retry` deciding which errors
/// earn another attempt.
pub async fn retry_with_backoff_when<F, Fut, T, P>(
    config: &RetryConfig,
    should_retry: P,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&Error) -> bool,
{
    let attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt + 1 < attempts && should_retry(&err) => {
                let delay = config.delay_for(attempt);
                warn!(
                    event_name = "client.connect.retry",
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
