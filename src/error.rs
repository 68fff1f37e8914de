//! Error types for the agent runtime

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the runtime
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Non-success HTTP status returned by an agent endpoint
    #[error("API error: {0}")]
    Api(String),

    /// The upstream model stream failed mid-iteration
    #[error("Provider stream error: {0}")]
    Provider(String),

    /// The model referenced a tool that is not registered
    #[error("Unknown tool: {0}")]
    ToolNotFound(String),

    /// Tool arguments failed the tool's parameter contract
    #[error("{0}")]
    ToolValidation(String),

    /// Tool execution error
    #[error("Tool execution error: {0}")]
    Tool(String),

    /// Streaming transport error
    #[error("Streaming error: {0}")]
    Stream(String),

    /// Error record received from a remote SSE producer
    #[error("Remote stream error: {0}")]
    Remote(String),

    /// Timeout error
    #[error("Request timeout")]
    Timeout,

    /// Other errors
    #[error("Error: {0}")]
    Other(String),
}

impl Error {
    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a new API error
    pub fn api(msg: impl Into<String>) -> Self {
        Error::Api(msg.into())
    }

    /// Create a new provider stream error
    pub fn provider(msg: impl Into<String>) -> Self {
        Error::Provider(msg.into())
    }

    /// Create a tool-not-found error
    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Error::ToolNotFound(name.into())
    }

    /// Create a parameter validation error
    pub fn tool_validation(msg: impl Into<String>) -> Self {
        Error::ToolValidation(msg.into())
    }

    /// Create a new stream error
    pub fn stream(msg: impl Into<String>) -> Self {
        Error::Stream(msg.into())
    }

    /// Create a new remote error
    pub fn remote(msg: impl Into<String>) -> Self {
        Error::Remote(msg.into())
    }

    /// Create a new tool error
    pub fn tool(msg: impl Into<String>) -> Self {
        Error::Tool(msg.into())
    }

    /// Create a new other error
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Create a timeout error
    pub fn timeout() -> Self {
        Error::Timeout
    }
}
