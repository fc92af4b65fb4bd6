//! Streaming tool-call parser (C13): detects tool calls embedded in a
//! provider's streamed text across three formats — JSON `tool_calls` arrays
//! (OpenAI function-call shape included), Anthropic `tool_use` blocks, and an
//! XML `<tool>NAME</tool><args>{...}</args>` form some local models emit.

use std::collections::HashMap;

/// A detected tool call, normalized to a flat string-keyed argument map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedToolCall {
    pub id: String,
    pub name: String,
    pub arguments: HashMap<String, String>,
}

fn stringify_args(value: &serde_json::Value) -> HashMap<String, String> {
    let mut out = HashMap::new();
    if let Some(obj) = value.as_object() {
        for (k, v) in obj {
            let s = match v {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            };
            out.insert(k.clone(), s);
        }
    }
    out
}

fn parse_json_tool_calls(text: &str) -> Vec<DetectedToolCall> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
        return Vec::new();
    };

    let mut out = Vec::new();

    if let Some(calls) = value.get("tool_calls").and_then(|c| c.as_array()) {
        for (idx, call) in calls.iter().enumerate() {
            let id = call
                .get("id")
                .and_then(|i| i.as_str())
                .map(|s| s.to_string())
                .unwrap_or_else(|| format!("call_{idx}"));
            // OpenAI function-call shape: {"type":"function","function":{"name":..,"arguments":..}}
            if let Some(function) = call.get("function") {
                let name = function.get("name").and_then(|n| n.as_str()).unwrap_or_default().to_string();
                let args = function.get("arguments").and_then(|a| a.as_str());
                let arguments = match args {
                    Some(raw) => serde_json::from_str::<serde_json::Value>(raw)
                        .map(|v| stringify_args(&v))
                        .unwrap_or_default(),
                    None => function.get("arguments").map(stringify_args).unwrap_or_default(),
                };
                if !name.is_empty() {
                    out.push(DetectedToolCall { id, name, arguments });
                }
                continue;
            }
            let name = call.get("name").and_then(|n| n.as_str()).unwrap_or_default().to_string();
            let arguments = call.get("arguments").map(stringify_args).unwrap_or_default();
            if !name.is_empty() {
                out.push(DetectedToolCall { id, name, arguments });
            }
        }
        return out;
    }

    // Anthropic tool_use form: {"type":"tool_use","id":..,"name":..,"input":{...}}
    if value.get("type").and_then(|t| t.as_str()) == Some("tool_use") {
        let id = value.get("id").and_then(|i| i.as_str()).unwrap_or("call_0").to_string();
        let name = value.get("name").and_then(|n| n.as_str()).unwrap_or_default().to_string();
        let arguments = value.get("input").map(stringify_args).unwrap_or_default();
        if !name.is_empty() {
            out.push(DetectedToolCall { id, name, arguments });
        }
    }

    out
}

fn parse_xml_tool_calls(text: &str) -> Vec<DetectedToolCall> {
    let mut out = Vec::new();
    let mut rest = text;
    let mut idx = 0;
    while let Some(tool_start) = rest.find("<tool>") {
        let after_open = &rest[tool_start + "<tool>".len()..];
        let Some(tool_end) = after_open.find("</tool>") else { break };
        let name = after_open[..tool_end].trim().to_string();
        let after_tool = &after_open[tool_end + "</tool>".len()..];

        let Some(args_start) = after_tool.find("<args>") else { break };
        let after_args_open = &after_tool[args_start + "<args>".len()..];
        let Some(args_end) = after_args_open.find("</args>") else { break };
        let args_raw = &after_args_open[..args_end];

        let arguments = serde_json::from_str::<serde_json::Value>(args_raw)
            .map(|v| stringify_args(&v))
            .unwrap_or_default();

        out.push(DetectedToolCall {
            id: format!("xml_call_{idx}"),
            name,
            arguments,
        });
        idx += 1;
        rest = &after_args_open[args_end + "</args>".len()..];
    }
    out
}

fn call_key(call: &DetectedToolCall) -> String {
    format!("{}:{}", call.name, serde_json::to_string(&call.arguments).unwrap_or_default())
}

/// Incrementally scans a growing text buffer for tool calls, firing each
/// detected call exactly once (even when the text arrived split across
/// multiple `feed` calls).
#[derive(Default)]
pub struct StreamToolParser {
    buffer: String,
    fired: std::collections::HashSet<String>,
    calls: Vec<DetectedToolCall>,
}

impl StreamToolParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk of streamed text. Returns newly detected calls
    /// (calls already fired in a prior `feed`/`finish` are never repeated).
    pub fn feed(&mut self, chunk: &str) -> Vec<DetectedToolCall> {
        self.buffer.push_str(chunk);
        self.scan()
    }

    /// Signal end-of-stream; performs a final scan over the buffer.
    pub fn finish(&mut self) -> Vec<DetectedToolCall> {
        self.scan()
    }

    pub fn calls(&self) -> &[DetectedToolCall] {
        &self.calls
    }

    fn scan(&mut self) -> Vec<DetectedToolCall> {
        let mut detected = parse_json_tool_calls(self.buffer.trim());
        detected.extend(parse_xml_tool_calls(&self.buffer));

        let mut fresh = Vec::new();
        for call in detected {
            let key = call_key(&call);
            if self.fired.insert(key) {
                self.calls.push(call.clone());
                fresh.push(call);
            }
        }
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_openai_style_tool_calls_array() {
        let mut parser = StreamToolParser::new();
        let text = r#"{"tool_calls":[{"id":"1","type":"function","function":{"name":"search","arguments":"{\"q\":\"rust\"}"}}]}"#;
        let fresh = parser.feed(text);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].name, "search");
        assert_eq!(fresh[0].arguments.get("q"), Some(&"rust".to_string()));
    }

    #[test]
    fn detects_anthropic_tool_use_block() {
        let mut parser = StreamToolParser::new();
        let text = r#"{"type":"tool_use","id":"toolu_1","name":"read_file","input":{"path":"a.txt"}}"#;
        let fresh = parser.feed(text);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].name, "read_file");
        assert_eq!(fresh[0].arguments.get("path"), Some(&"a.txt".to_string()));
    }

    #[test]
    fn detects_xml_tool_call() {
        let mut parser = StreamToolParser::new();
        let fresh = parser.feed(r#"<tool>list_files</tool><args>{"dir":"."}</args>"#);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].name, "list_files");
        assert_eq!(fresh[0].arguments.get("dir"), Some(&".".to_string()));
    }

    #[test]
    fn xml_call_split_across_chunks_fires_once() {
        let mut parser = StreamToolParser::new();
        let first = parser.feed("<tool>list_files</tool><args>{\"dir\":");
        assert!(first.is_empty());
        let second = parser.feed("\".\"}</args>");
        assert_eq!(second.len(), 1);
        let third = parser.finish();
        assert!(third.is_empty());
    }

    #[test]
    fn nested_values_are_stringified() {
        let mut parser = StreamToolParser::new();
        let text = r#"{"type":"tool_use","id":"t1","name":"f","input":{"count":3,"ok":true,"tags":["a","b"]}}"#;
        let fresh = parser.feed(text);
        assert_eq!(fresh[0].arguments.get("count"), Some(&"3".to_string()));
        assert_eq!(fresh[0].arguments.get("ok"), Some(&"true".to_string()));
        assert_eq!(fresh[0].arguments.get("tags"), Some(&"[\"a\",\"b\"]".to_string()));
    }
}
