//! Server-Sent Events framing for chunk streams.
//!
//! Wire format, one record per chunk:
//!
//! ```text
//! data: {"type":"text","delta":"Hello"}
//!
//! data: {"type":"tool_result","callId":"1","result":5}
//!
//! data: {"type":"text","delta":"\n"}
//!
//! data: {"type":"text","delta":"The answer is 5."}
//!
//! data: [DONE]
//!
//! ```
//!
//! - The encoder injects a synthetic `"\n"` text record before the first
//!   text that follows a tool outcome, so prose on either side of a tool
//!   call does not run together in a UI.
//! - An upstream failure becomes one `{"type":"error","message":..}` record.
//! - `[DONE]` always terminates the stream, after success and failure alike.
//!
//! The decoder reverses this for clients; [`accumulate_stream`] folds a
//! decoded stream into a [`CompletionResult`].

use crate::accumulator::CompletionFold;
use crate::provider::ChunkStream;
use crate::types::{CompletionResult, StreamChunk};
use crate::{Error, Result};
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use serde_json::Value;
use tracing::{error, warn};

/// Terminal sentinel payload.
pub const SSE_DONE: &str = "[DONE]";

/// Headers every SSE response carries.
pub const SSE_HEADERS: [(&str, &str); 4] = [
    ("content-type", "text/event-stream"),
    ("cache-control", "no-cache, no-store, must-revalidate"),
    ("connection", "keep-alive"),
    ("x-accel-buffering", "no"),
];

/// Frame one payload as an SSE `data:` record.
pub fn format_sse_record(payload: &str) -> String {
    format!("data: {}\n\n", payload)
}

/// Encode a chunk stream as SSE records.
///
/// The output always ends with `data: [DONE]`. Encoding stops at the first
/// `Err` item, which is reported as an `error` record.
pub fn encode_sse<S>(stream: S) -> impl Stream<Item = String> + Send + 'static
where
    S: Stream<Item = Result<StreamChunk>> + Send + 'static,
{
    async_stream::stream! {
        let mut stream = Box::pin(stream);
        let mut after_tool_outcome = false;

        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => {
                    if let StreamChunk::Text { .. } = chunk {
                        if after_tool_outcome {
                            yield encode_chunk(&StreamChunk::text("\n"));
                        }
                        after_tool_outcome = false;
                    } else if chunk.is_tool_outcome() {
                        after_tool_outcome = true;
                    }
                    yield encode_chunk(&chunk);
                }
                Err(e) => {
                    warn!(event_name = "agent.sse.upstream_failed", error = %e);
                    let record = serde_json::json!({ "type": "error", "message": e.to_string() });
                    yield format_sse_record(&record.to_string());
                    break;
                }
            }
        }

        yield format_sse_record(SSE_DONE);
    }
}

fn encode_chunk(chunk: &StreamChunk) -> String {
    match serde_json::to_string(chunk) {
        Ok(json) => format_sse_record(&json),
        Err(e) => {
            // Unreachable for the closed chunk set; keep the stream well-formed regardless
            error!(event_name = "agent.sse.encode_failed", error = %e);
            let record = serde_json::json!({ "type": "error", "message": e.to_string() });
            format_sse_record(&record.to_string())
        }
    }
}

/// One decoded SSE payload.
#[derive(Debug, Clone, PartialEq)]
pub enum SseRecord {
    Chunk(StreamChunk),
    Error(String),
    Done,
}

/// Interpret the `data` of one SSE record.
pub fn parse_sse_record(data: &str) -> std::result::Result<SseRecord, serde_json::Error> {
    let data = data.trim();
    if data == SSE_DONE {
        return Ok(SseRecord::Done);
    }

    let value: Value = serde_json::from_str(data)?;
    if value.get("type").and_then(Value::as_str) == Some("error") {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Ok(SseRecord::Error(message));
    }

    serde_json::from_value(value).map(SseRecord::Chunk)
}

/// Decode an SSE byte stream back into chunks.
///
/// Ends at `[DONE]` or when the body ends. Malformed records are logged and
/// skipped; an `error` record yields one [`Error::Remote`] and ends the
/// stream; transport failures yield one [`Error::Stream`].
///
/// Any byte-chunk stream works, e.g. `reqwest::Response::bytes_stream()`.
pub fn decode_sse<S, B, E>(body: S) -> ChunkStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut events = Box::pin(body.eventsource());

        while let Some(event) = events.next().await {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    yield Err(Error::stream(e.to_string()));
                    return;
                }
            };

            if event.data.is_empty() {
                continue;
            }

            match parse_sse_record(&event.data) {
                Ok(SseRecord::Chunk(chunk)) => yield Ok(chunk),
                Ok(SseRecord::Done) => return,
                Ok(SseRecord::Error(message)) => {
                    yield Err(Error::remote(message));
                    return;
                }
                Err(e) => {
                    warn!(event_name = "agent.sse.malformed_record", error = %e, data = %event.data);
                }
            }
        }
    })
}

/// Fold a chunk stream into a [`CompletionResult`].
///
/// Pure reduction: the first `Err` item is returned as-is, and `aborted` is
/// always `false`.
pub async fn accumulate_stream<S>(stream: S) -> Result<CompletionResult>
where
    S: Stream<Item = Result<StreamChunk>>,
{
    let mut stream = std::pin::pin!(stream);
    let mut fold = CompletionFold::new();
    while let Some(item) = stream.next().await {
        fold.apply(&item?);
    }
    Ok(fold.finish(false))
}
