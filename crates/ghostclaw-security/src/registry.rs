//! Tool registry + contracts (C11): register, list specs, lookup.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Execution context passed to every tool call (§4.5).
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub session_id: String,
    pub main_session_id: String,
    pub agent_id: String,
    pub channel_id: String,
    pub group_id: Option<String>,
    pub tool_profile: Option<String>,
    pub workspace_path: String,
    pub sandbox_enabled: bool,
    pub provider: Option<String>,
}

/// `{ id, name, arguments: map<string,string> }` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: HashMap<String, String>,
}

/// `{ id, name, { success, output, truncated, metadata } }` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub id: String,
    pub name: String,
    pub success: bool,
    pub output: String,
    #[serde(default)]
    pub truncated: bool,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ToolCallResult {
    pub fn ok(id: impl Into<String>, name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            success: true,
            output: output.into(),
            truncated: false,
            metadata: HashMap::new(),
        }
    }

    pub fn fail(id: impl Into<String>, name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            success: false,
            output: output.into(),
            truncated: false,
            metadata: HashMap::new(),
        }
    }
}

/// A JSON-schema-like description of a tool, handed to the provider as part
/// of the `tools` block (§4.1).
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A registered operation the agent engine can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// Group used by the approval manager (`"runtime"` is always dangerous).
    fn group(&self) -> &str {
        "default"
    }
    /// JSON-schema-shaped parameter description for the provider's tools block.
    fn parameters(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }
    /// `false` marks the tool dangerous regardless of group (§4.5 step 5).
    fn is_safe(&self) -> bool {
        true
    }
    async fn execute(&self, arguments: &HashMap<String, String>, ctx: &ToolContext) -> ToolCallResult;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: DashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|entry| entry.value().clone())
    }

    pub fn list_specs(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|entry| ToolSpec {
                name: entry.value().name().to_string(),
                description: entry.value().description().to_string(),
                parameters: entry.value().parameters(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo_tool"
        }
        fn description(&self) -> &str {
            "echoes its `value` argument"
        }
        async fn execute(&self, arguments: &HashMap<String, String>, _ctx: &ToolContext) -> ToolCallResult {
            let value = arguments.get("value").cloned().unwrap_or_default();
            ToolCallResult::ok("1", "echo_tool", value)
        }
    }

    #[test]
    fn register_and_lookup() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        assert!(registry.lookup("echo_tool").is_some());
        assert!(registry.lookup("missing").is_none());
        assert_eq!(registry.list_specs().len(), 1);
    }
}
