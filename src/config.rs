//! Configuration helpers for the agent runtime
//!
//! Values resolve in the order: environment variable, explicit value,
//! built-in default. Every reader has a `*_from_lookup` / `from_lookup`
//! twin that takes the variable source as a closure, so tests never touch
//! the process environment.

use crate::agent_loop::DEFAULT_MAX_ITERATIONS;
use crate::{Error, Result};
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

/// Runtime URL used when neither the environment nor the caller provides one.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8787";

pub const ENV_SERVER_URL: &str = "AGENT_RUNTIME_URL";
pub const ENV_BIND_ADDRESS: &str = "AGENT_RUNTIME_BIND_ADDRESS";
pub const ENV_PORT: &str = "AGENT_RUNTIME_PORT";
pub const ENV_MAX_ITERATIONS: &str = "AGENT_RUNTIME_MAX_ITERATIONS";
pub const ENV_SYSTEM_PROMPT: &str = "AGENT_RUNTIME_SYSTEM_PROMPT";
pub const ENV_HISTORY_LIMIT: &str = "AGENT_RUNTIME_HISTORY_LIMIT";
pub const ENV_MAX_SESSIONS: &str = "AGENT_RUNTIME_MAX_SESSIONS";
pub const ENV_LOG_LEVEL: &str = "AGENT_RUNTIME_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "AGENT_RUNTIME_LOG_FORMAT";

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(Error::config(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// An `EnvFilter` directive such as `info` or `agent_runtime=debug,tower=warn`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `config.level` when set. Fails if a
/// global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| Error::config(format!("invalid log level `{}`: {}", config.level, e)))?;

    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter);

    let installed = match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    installed.map_err(|e| Error::config(format!("logging already initialized: {}", e)))
}

/// Settings for the HTTP host.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub max_iterations: usize,
    /// Prepended to every new session's history.
    pub system_prompt: Option<String>,
    /// Most recent messages of a session fed back to the loop.
    pub history_limit: usize,
    /// Sessions kept in memory; the least recently used one is evicted first.
    pub max_sessions: usize,
    pub logging: LogConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8787,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            system_prompt: None,
            history_limit: 20,
            max_sessions: 1024,
            logging: LogConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `AGENT_RUNTIME_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(value) = read(ENV_BIND_ADDRESS) {
            config.bind_address = value.trim().to_string();
        }
        if let Some(value) = read(ENV_PORT) {
            config.port = parse_number(ENV_PORT, &value)?;
        }
        if let Some(value) = read(ENV_MAX_ITERATIONS) {
            config.max_iterations = parse_number(ENV_MAX_ITERATIONS, &value)?;
        }
        if let Some(value) = read(ENV_SYSTEM_PROMPT) {
            config.system_prompt = Some(value);
        }
        if let Some(value) = read(ENV_HISTORY_LIMIT) {
            config.history_limit = parse_number(ENV_HISTORY_LIMIT, &value)?;
        }
        if let Some(value) = read(ENV_MAX_SESSIONS) {
            config.max_sessions = parse_number(ENV_MAX_SESSIONS, &value)?;
        }
        if let Some(value) = read(ENV_LOG_LEVEL) {
            config.logging.level = value.trim().to_string();
        }
        if let Some(value) = read(ENV_LOG_FORMAT) {
            config.logging.format = value.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(Error::config("max_iterations must be at least 1"));
        }
        if self.max_sessions == 0 {
            return Err(Error::config("max_sessions must be at least 1"));
        }
        self.socket_addr().map(|_| ())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .map_err(|e| {
                Error::config(format!(
                    "invalid bind address `{}:{}`: {}",
                    self.bind_address, self.port, e
                ))
            })
    }
}

fn parse_number<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
{
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("invalid value for `{key}`: `{value}`")))
}

/// Resolve the runtime URL for clients.
///
/// Priority:
/// 1. `AGENT_RUNTIME_URL` environment variable
/// 2. `fallback`
/// 3. [`DEFAULT_SERVER_URL`]
///
/// ```rust,no_run
/// use agent_runtime::get_server_url;
///
/// let url = get_server_url(Some("http://agents.internal:8787"));
/// ```
pub fn get_server_url(fallback: Option<&str>) -> String {
    server_url_from_lookup(|key| std::env::var(key).ok(), fallback)
}

pub fn server_url_from_lookup<F>(lookup: F, fallback: Option<&str>) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(ENV_SERVER_URL)
        .filter(|url| !url.trim().is_empty())
        .or_else(|| fallback.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string())
}
