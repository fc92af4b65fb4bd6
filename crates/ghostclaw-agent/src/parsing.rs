//! Shared response parsing (C3): OpenAI/Anthropic content extraction and SSE
//! event decoding. Uses `serde_json::Value` rather than hand-rolled string
//! scanning — see DESIGN.md.

use crate::provider::ProviderError;

/// Extract assistant text from an OpenAI-compatible `chat.completions` body.
/// If the model requested tool calls, they're appended as a trailing
/// `{"tool_calls":[...]}' envelope so callers (the stream tool parser) can
/// detect them uniformly whether they arrived via SSE deltas or a single body.
pub fn parse_openai_content(body: &str) -> std::result::Result<String, ProviderError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;

    let choices = value
        .get("choices")
        .and_then(|c| c.as_array())
        .ok_or_else(|| ProviderError::Parse("missing choices array".to_string()))?;
    let first = choices
        .first()
        .ok_or_else(|| ProviderError::Parse("empty choices array".to_string()))?;
    let message = first.get("message").unwrap_or(&serde_json::Value::Null);

    let content = message
        .get("content")
        .and_then(|c| c.as_str())
        .unwrap_or("")
        .to_string();

    let tool_calls = message.get("tool_calls").and_then(|t| t.as_array());
    match tool_calls {
        Some(calls) if !calls.is_empty() => {
            let envelope = serde_json::json!({ "tool_calls": calls });
            if content.is_empty() {
                Ok(envelope.to_string())
            } else {
                Ok(format!("{content}\n{envelope}"))
            }
        }
        _ => Ok(content),
    }
}

/// Extract assistant text from an Anthropic `messages` response body.
pub fn parse_anthropic_content(body: &str) -> std::result::Result<String, ProviderError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;

    let blocks = value
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| ProviderError::Parse("missing content array".to_string()))?;

    let mut text = String::new();
    for block in blocks {
        if block.get("type").and_then(|t| t.as_str()) == Some("text") {
            if let Some(t) = block.get("text").and_then(|t| t.as_str()) {
                text.push_str(t);
            }
        } else if block.get("type").and_then(|t| t.as_str()) == Some("tool_use") {
            text.push_str(&block.to_string());
        }
    }
    Ok(text)
}

/// True when a response looks like an SSE stream, either by content-type or
/// by sniffing the body for a leading `data:` line.
pub fn is_event_stream(content_type: Option<&str>, body_sample: &str) -> bool {
    if let Some(ct) = content_type {
        if ct.contains("text/event-stream") {
            return true;
        }
    }
    body_sample.lines().any(|l| l.starts_with("data:"))
}

/// Accumulates raw SSE bytes across chunk boundaries, emitting complete
/// `data:` payloads as they're flushed on a blank line. `[DONE]` is returned
/// as `None` from `push` (signals end-of-stream to the caller).
#[derive(Default)]
pub struct SseDecoder {
    buffer: String,
    pending_data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns fully-decoded event payloads extracted so far.
    /// `None` in the returned vec marks the `[DONE]` sentinel.
    pub fn push(&mut self, chunk: &str) -> Vec<Option<String>> {
        self.buffer.push_str(chunk);
        let mut out = Vec::new();

        while let Some(idx) = self.buffer.find('\n') {
            let line = self.buffer[..idx].trim_end_matches('\r').to_string();
            self.buffer.drain(..=idx);

            if line.is_empty() {
                if !self.pending_data.is_empty() {
                    let payload = self.pending_data.join("\n");
                    self.pending_data.clear();
                    if payload == "[DONE]" {
                        out.push(None);
                    } else {
                        out.push(Some(payload));
                    }
                }
                continue;
            }

            if let Some(data) = line.strip_prefix("data:") {
                self.pending_data.push(data.strip_prefix(' ').unwrap_or(data).to_string());
            }
        }
        out
    }
}

/// Extract the incremental text delta from a single OpenAI SSE event payload.
pub fn parse_openai_sse_delta(payload: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(payload).ok()?;
    let delta = value.get("choices")?.get(0)?.get("delta")?;
    delta.get("content").and_then(|c| c.as_str()).map(|s| s.to_string())
}

/// Extract the incremental text delta from a single Anthropic SSE event
/// payload (`content_block_delta` / `text_delta`).
pub fn parse_anthropic_sse_delta(payload: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(payload).ok()?;
    if value.get("type").and_then(|t| t.as_str()) != Some("content_block_delta") {
        return None;
    }
    let delta = value.get("delta")?;
    if delta.get("type").and_then(|t| t.as_str()) != Some("text_delta") {
        return None;
    }
    delta.get("text").and_then(|t| t.as_str()).map(|s| s.to_string())
}
