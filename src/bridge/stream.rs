//! Streaming response processor
//!
//! Reassembles SSE framing from an incoming byte stream, one buffered
//! partial line of carry-over and no backtracking. Every decoded payload is
//! mapped to a canonical fragment and forwarded immediately; malformed lines
//! are logged and skipped, never fatal to the stream. The processor drains
//! the stream to its natural end rather than closing early on a mid-stream
//! finish flag, so a multi-event terminal sequence is never truncated.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::domain::{Binding, BridgeFragment, BridgeRequest};

use super::transformer::map_response_fragment;
use super::{BridgeError, BridgeResult};

/// Incremental SSE line decoder.
///
/// Feed raw chunks in; complete lines come out. The trailing (possibly
/// incomplete) segment of each chunk is held back until the next feed.
#[derive(Debug, Default)]
pub struct SseDecoder {
    carry: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every newly completed line.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.carry.push_str(&String::from_utf8_lossy(chunk));
        let mut lines = Vec::new();
        while let Some(pos) = self.carry.find('\n') {
            let line = self.carry[..pos].to_string();
            self.carry = self.carry[pos + 1..].to_string();
            lines.push(line);
        }
        lines
    }

    /// Whatever is still buffered when the stream ends.
    pub fn remainder(&self) -> &str {
        &self.carry
    }
}

/// Extract the event payload from one SSE line.
///
/// Returns `None` for blank lines, non-data lines, and the `[DONE]` control
/// token (which is dropped, not forwarded).
pub fn data_payload(line: &str) -> Option<&str> {
    if line.trim().is_empty() {
        return None;
    }
    let data = line.strip_prefix("data: ")?;
    if data == "[DONE]" {
        return None;
    }
    Some(data)
}

/// Drive an SSE byte stream to its end, emitting canonical fragments.
///
/// In-order, at-least-once delivery matching input line order. A JSON parse
/// failure or a fragment-level mapping error skips that line with a warning.
pub async fn pump_event_stream<S, E>(
    mut stream: S,
    binding: &Binding,
    request: &BridgeRequest,
    tx: &mpsc::Sender<BridgeFragment>,
) -> BridgeResult<()>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    let mut decoder = SseDecoder::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| BridgeError::Transport(format!("Stream read error: {}", e)))?;
        for line in decoder.feed(&chunk) {
            let Some(data) = data_payload(&line) else {
                continue;
            };
            let raw: Value = match serde_json::from_str(data) {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!(agent_id = %request.agent_id, "Skipping unparseable SSE payload: {}", e);
                    continue;
                }
            };
            match map_response_fragment(binding, &raw, &request.message_id, &request.agent_id) {
                Ok(fragment) => {
                    if tx.send(fragment).await.is_err() {
                        // Caller went away; keep draining is pointless.
                        return Ok(());
                    }
                }
                Err(e) => {
                    tracing::warn!(agent_id = %request.agent_id, "Failed to transform fragment: {}", e);
                }
            }
        }
    }

    // Orderly shutdown: no synthesized finish fragment. Callers treat
    // unexpected stream end as completion.
    Ok(())
}

/// Parse a full (non-streaming) response body: JSON if it is JSON, otherwise
/// the raw text wrapped under `text_response`.
pub fn full_body_value(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| json!({ "text_response": text }))
}
