//! Core types for the agent runtime
//!
//! Everything that crosses a layer boundary lives here: the [`StreamChunk`]
//! protocol emitted by providers and the agent loop, the [`Message`]
//! conversation model fed back to providers, and the [`CompletionResult`]
//! summary delivered to completion observers.
//!
//! Wire forms are camelCase JSON so that SSE consumers written in any
//! language see the same field names (`callId`, `finishReason`, ...).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Finish reason reported when no `done` chunk carried one.
pub const FINISH_REASON_STOP: &str = "stop";

/// Finish reason reported when the run was cancelled.
pub const FINISH_REASON_ABORT: &str = "abort";

/// Message role in the conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A structured request from the model to invoke a named tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlates this call with its result or error within one loop run.
    pub id: String,
    pub name: String,
    /// Opaque structured arguments, validated by the tool's parameter contract.
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Token usage reported by a provider on a `done` chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

impl Usage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }
}

impl std::ops::AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens = self.input_tokens.saturating_add(rhs.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(rhs.output_tokens);
    }
}

/// One unit of the agent's output protocol.
///
/// Serialized with an internal `"type"` tag:
///
/// ```json
/// {"type":"text","delta":"Hello"}
/// {"type":"tool_call","call":{"id":"1","name":"add","arguments":{"a":2,"b":3}}}
/// {"type":"tool_result","callId":"1","result":5}
/// {"type":"tool_error","callId":"2","error":"Unknown tool: subtract"}
/// {"type":"done","finishReason":"stop","hasToolCalls":false,"usage":{"inputTokens":10,"outputTokens":4}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    Text {
        delta: String,
    },
    ToolCall {
        call: ToolCall,
    },
    ToolResult {
        #[serde(rename = "callId")]
        call_id: String,
        result: Value,
    },
    ToolError {
        #[serde(rename = "callId")]
        call_id: String,
        error: String,
    },
    Done {
        #[serde(rename = "finishReason")]
        finish_reason: String,
        #[serde(rename = "hasToolCalls", default)]
        has_tool_calls: bool,
        #[serde(default)]
        usage: Usage,
    },
}

impl StreamChunk {
    pub fn text(delta: impl Into<String>) -> Self {
        StreamChunk::Text {
            delta: delta.into(),
        }
    }

    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        StreamChunk::ToolCall {
            call: ToolCall::new(id, name, arguments),
        }
    }

    pub fn tool_result(call_id: impl Into<String>, result: Value) -> Self {
        StreamChunk::ToolResult {
            call_id: call_id.into(),
            result,
        }
    }

    pub fn tool_error(call_id: impl Into<String>, error: impl Into<String>) -> Self {
        StreamChunk::ToolError {
            call_id: call_id.into(),
            error: error.into(),
        }
    }

    pub fn done(finish_reason: impl Into<String>, has_tool_calls: bool, usage: Usage) -> Self {
        StreamChunk::Done {
            finish_reason: finish_reason.into(),
            has_tool_calls,
            usage,
        }
    }

    /// True for `tool_result` and `tool_error`.
    pub fn is_tool_outcome(&self) -> bool {
        matches!(
            self,
            StreamChunk::ToolResult { .. } | StreamChunk::ToolError { .. }
        )
    }
}

/// Image reference inside an `image_url` content part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// One ordered element of a multi-part message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
    ToolUse { id: String, name: String, input: Value },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image_url(url: impl Into<String>) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl { url: url.into() },
        }
    }

    pub fn tool_use(call: &ToolCall) -> Self {
        ContentPart::ToolUse {
            id: call.id.clone(),
            name: call.name.clone(),
            input: call.arguments.clone(),
        }
    }
}

/// Message body: plain text or an ordered list of parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Concatenated text of the body, ignoring non-text parts.
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } | ContentPart::ToolUse { .. } => None,
                })
                .collect(),
        }
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        MessageContent::Text(text)
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::Text(text.to_string())
    }
}

impl From<Vec<ContentPart>> for MessageContent {
    fn from(parts: Vec<ContentPart>) -> Self {
        MessageContent::Parts(parts)
    }
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: MessageRole,
    pub content: MessageContent,
    /// Set on `tool` messages to correlate with the originating call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool name on `tool` messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<MessageContent>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageRole::User, text.into())
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(MessageRole::System, text.into())
    }

    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Create a user message with custom content parts
    pub fn user_with_parts(parts: Vec<ContentPart>) -> Self {
        Self::new(MessageRole::User, parts)
    }

    /// Tool-role message carrying a serialized tool outcome.
    pub fn tool(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: MessageRole::Tool,
            content: MessageContent::Text(content.into()),
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
        }
    }
}

/// One tool outcome as recorded in a [`CompletionResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultRecord {
    pub call_id: String,
    /// Resolved from the matching `tool_call`; `None` when no call was seen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The folded summary of one agent turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResult {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolResultRecord>,
    pub usage: Usage,
    pub finish_reason: String,
    pub aborted: bool,
}
