//! Conversation size helpers
//!
//! Opt-in utilities for keeping session history inside a model's context
//! window. The HTTP host uses [`truncate_messages`] when replaying a
//! session; hosts embedding the loop directly can use them the same way.
//!
//! ```rust
//! use agent_runtime::{estimate_tokens, truncate_messages, Message};
//!
//! let history = vec![
//!     Message::system("You are a helpful assistant"),
//!     Message::user("Hello!"),
//!     Message::assistant("Hi! How can I help?"),
//! ];
//!
//! if estimate_tokens(&history) > 28_000 {
//!     let trimmed = truncate_messages(&history, 10, true);
//!     assert!(trimmed.len() <= 11);
//! }
//! ```

use crate::types::{ContentPart, Message, MessageContent, MessageRole};

/// Estimate the token count of a message list.
///
/// Character-based approximation (about 4 characters per token) with a
/// small per-message overhead for role framing. Real tokenizers differ by
/// model family, so leave a 10-20% margin when comparing against a limit.
pub fn estimate_tokens(messages: &[Message]) -> usize {
    if messages.is_empty() {
        return 0;
    }

    let mut total_chars = 16;

    for message in messages {
        // role framing
        total_chars += 8;

        total_chars += match &message.content {
            MessageContent::Text(text) => text.len(),
            MessageContent::Parts(parts) => parts.iter().map(part_chars).sum(),
        };

        if let Some(id) = &message.tool_call_id {
            total_chars += id.len();
        }
        if let Some(name) = &message.name {
            total_chars += name.len();
        }
    }

    total_chars.div_ceil(4)
}

fn part_chars(part: &ContentPart) -> usize {
    match part {
        ContentPart::Text { text } => text.len(),
        // Images are billed by providers in ways text length cannot predict;
        // count the reference only
        ContentPart::ImageUrl { image_url } => image_url.url.len(),
        ContentPart::ToolUse { id, name, input } => id.len() + name.len() + input.to_string().len(),
    }
}

/// Keep the most recent `keep` messages, plus a leading system prompt when
/// `preserve_system` is set.
///
/// The cut never starts on a `tool` message: orphaned tool results would
/// reference a call the model can no longer see, so the window is shrunk
/// until it begins at a user or assistant turn.
pub fn truncate_messages(messages: &[Message], keep: usize, preserve_system: bool) -> Vec<Message> {
    if messages.len() <= keep {
        return messages.to_vec();
    }

    let system = messages
        .first()
        .filter(|m| preserve_system && m.role == MessageRole::System);

    let body = if system.is_some() { &messages[1..] } else { messages };
    let mut start = body.len().saturating_sub(keep);
    while start < body.len() && body[start].role == MessageRole::Tool {
        start += 1;
    }

    system
        .into_iter()
        .chain(body[start..].iter())
        .cloned()
        .collect()
}

/// Whether the estimated size exceeds `limit * margin`.
pub fn is_approaching_limit(messages: &[Message], limit: usize, margin: f32) -> bool {
    let threshold = (limit as f32 * margin) as usize;
    estimate_tokens(messages) > threshold
}
