//! Agent engine (C15): builds the system prompt, recalls memory, runs the
//! provider/tool loop, and optionally persists the turn back to memory.

use std::sync::Arc;
use std::time::Instant;

use regex::Regex;
use tracing::{info, warn};

use ghostclaw_core::types::ThinkingLevel;
use ghostclaw_memory::{Memory, MemoryCategory};
use ghostclaw_security::{ToolCallRequest, ToolContext, ToolExecutor, ToolRegistry};

use crate::context_builder::ContextBuilder;
use crate::health::{HealthTracker, ProviderHealthEntry};
use crate::provider::{OnChunk, Provider, Result, StreamChunk};
use crate::stream_parser::StreamToolParser;

const DEFAULT_MAX_TOOL_ITERATIONS: u32 = 10;
const MEMORY_RECALL_LIMIT: usize = 5;
const MEMORY_SCORE_THRESHOLD: f64 = 0.3;

/// Per-call overrides layered on top of the agent's defaults (§4.6 Options).
#[derive(Debug, Clone, Default)]
pub struct AgentOptions {
    pub provider_override: Option<String>,
    pub model_override: Option<String>,
    pub temperature_override: Option<f32>,
    pub thinking: Option<ThinkingLevel>,
    pub session_id: Option<String>,
    pub agent_id: Option<String>,
    pub channel_id: Option<String>,
    pub group_id: Option<String>,
    pub tool_profile: Option<String>,
    pub max_tool_iterations: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub text: String,
    pub tool_iterations: u32,
    pub elapsed_ms: u64,
}

/// Callbacks driving a streaming invocation.
pub struct StreamCallbacks<'a> {
    pub on_token: Box<dyn FnMut(&str) + Send + 'a>,
    pub on_done: Box<dyn FnMut(&AgentResponse) + Send + 'a>,
    pub on_error: Box<dyn FnMut(&str) + Send + 'a>,
}

fn prompt_injection_regex() -> Regex {
    Regex::new(r"(?i)ignore (all|previous|the above) instructions|disregard (all|your) (prior|previous) (rules|instructions)")
        .expect("valid regex")
}

fn prompt_leak_regex() -> Regex {
    Regex::new(r"(?i)(system prompt|you are instructed to|as an ai language model,? my instructions)")
        .expect("valid regex")
}

pub struct AgentEngine {
    provider: Arc<dyn Provider>,
    tool_registry: Arc<ToolRegistry>,
    executor: Arc<ToolExecutor>,
    memory: Option<Arc<dyn Memory>>,
    context_builder: ContextBuilder,
    default_model: String,
    default_temperature: f32,
    auto_save_memory: bool,
    sandbox_enabled: bool,
    agent_id: String,
    workspace_path: String,
    health: Arc<HealthTracker>,
}

impl AgentEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<dyn Provider>,
        tool_registry: Arc<ToolRegistry>,
        executor: Arc<ToolExecutor>,
        memory: Option<Arc<dyn Memory>>,
        workspace_path: impl Into<String>,
        default_model: impl Into<String>,
        default_temperature: f32,
        auto_save_memory: bool,
        sandbox_enabled: bool,
        agent_id: impl Into<String>,
    ) -> Self {
        let workspace_path = workspace_path.into();
        Self {
            provider,
            tool_registry,
            executor,
            memory,
            context_builder: ContextBuilder::new(workspace_path.clone()),
            default_model: default_model.into(),
            default_temperature,
            auto_save_memory,
            sandbox_enabled,
            agent_id: agent_id.into(),
            workspace_path,
            health: HealthTracker::new(),
        }
    }

    /// Snapshot of per-provider request health (§4.1), surfaced by the
    /// gateway's `/health` endpoint and `health` RPC method.
    pub fn health_snapshot(&self) -> Vec<ProviderHealthEntry> {
        self.health.all_entries()
    }

    fn resolve_model(&self, options: &AgentOptions) -> String {
        options.model_override.clone().unwrap_or_else(|| self.default_model.clone())
    }

    fn resolve_temperature(&self, options: &AgentOptions) -> f32 {
        let base = options.temperature_override.unwrap_or(self.default_temperature);
        match &options.thinking {
            Some(level) => level.temperature(base),
            None => base,
        }
    }

    async fn build_system_prompt(&self) -> String {
        let tools = self.tool_registry.list_specs();
        self.context_builder.build(&tools, &[])
    }

    async fn recall_memory_block(&self, message: &str) -> String {
        let Some(memory) = &self.memory else { return String::new() };
        if message.trim().is_empty() {
            return String::new();
        }
        let results = match memory.recall(message, MEMORY_RECALL_LIMIT).await {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, "memory recall failed, continuing without it");
                return String::new();
            }
        };
        let relevant: Vec<_> = results
            .into_iter()
            .filter(|entry| entry.score.unwrap_or(1.0) >= MEMORY_SCORE_THRESHOLD)
            .collect();
        if relevant.is_empty() {
            return String::new();
        }
        let mut block = String::from("\n\n## Relevant memory\n");
        for entry in relevant {
            block.push_str(&format!("- {}\n", entry.content));
        }
        block
    }

    fn tool_context(&self, options: &AgentOptions, provider_name: &str) -> ToolContext {
        let session_id = options.session_id.clone().unwrap_or_else(|| "default".to_string());
        ToolContext {
            session_id: session_id.clone(),
            main_session_id: session_id,
            agent_id: options.agent_id.clone().unwrap_or_else(|| self.agent_id.clone()),
            channel_id: options.channel_id.clone().unwrap_or_else(|| "direct".to_string()),
            group_id: options.group_id.clone(),
            tool_profile: options.tool_profile.clone(),
            workspace_path: self.workspace_path.clone(),
            sandbox_enabled: self.sandbox_enabled,
            provider: Some(provider_name.to_string()),
        }
    }

    async fn maybe_store_turn(&self, user_message: &str, assistant_text: &str) {
        if !self.auto_save_memory {
            return;
        }
        let Some(memory) = &self.memory else { return };
        let key = format!("turn-{}", ghostclaw_memory::now_rfc3339());
        let content = format!("User: {user_message}\nAssistant: {assistant_text}");
        if let Err(e) = memory.store(&key, &content, MemoryCategory::Conversation).await {
            warn!(error = %e, "failed to auto-save conversation turn");
        }
    }

    /// Non-streaming entry point (§4.6).
    pub async fn run(&self, message: &str, options: AgentOptions) -> Result<AgentResponse> {
        let start = Instant::now();
        info!(agent_id = %self.agent_id, "agent.start");

        if prompt_injection_regex().is_match(message) {
            warn!("possible prompt injection detected in user input");
        }

        let system_prompt = self.build_system_prompt().await;
        let memory_block = self.recall_memory_block(message).await;
        let full_message = if memory_block.is_empty() {
            message.to_string()
        } else {
            format!("{memory_block}{message}")
        };

        let model = self.resolve_model(&options);
        let temperature = self.resolve_temperature(&options);
        let max_iterations = options.max_tool_iterations.unwrap_or(DEFAULT_MAX_TOOL_ITERATIONS);

        let mut current_message = full_message;
        let mut last_text = String::new();
        let mut iterations = 0;

        while iterations < max_iterations {
            let tools = self.tool_registry.list_specs();
            let call_start = Instant::now();
            let response_text = match self
                .provider
                .chat_with_system_tools(Some(&system_prompt), &current_message, &model, temperature, &tools)
                .await
            {
                Ok(text) => {
                    self.health.record_success(self.provider.name(), call_start.elapsed().as_millis() as u64);
                    text
                }
                Err(e) => {
                    self.health.record_error(self.provider.name(), &e);
                    return Err(e);
                }
            };

            let mut parser = StreamToolParser::new();
            parser.feed(&response_text);
            let calls = parser.finish();

            if calls.is_empty() {
                last_text = response_text;
                break;
            }

            let ctx = self.tool_context(&options, self.provider.name());
            let requests: Vec<ToolCallRequest> = calls
                .iter()
                .map(|c| ToolCallRequest { id: c.id.clone(), name: c.name.clone(), arguments: c.arguments.clone() })
                .collect();
            let results = self.executor.execute_batch(requests, ctx).await;

            let mut tool_summary = String::from("\n\n## Tool results\n");
            for result in &results {
                tool_summary.push_str(&format!("- {} ({}): {}\n", result.name, result.success, result.output));
            }
            current_message = format!("{response_text}{tool_summary}");
            last_text = response_text;
            iterations += 1;
        }

        if prompt_leak_regex().is_match(&last_text) {
            warn!("possible system prompt leak detected in model output");
        }

        self.maybe_store_turn(message, &last_text).await;

        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(agent_id = %self.agent_id, elapsed_ms, iterations, "agent.end");

        Ok(AgentResponse { text: last_text, tool_iterations: iterations, elapsed_ms })
    }

    /// Streaming entry point (§4.6). Tool calls still run between provider
    /// turns; only the final turn's tokens are forwarded to `on_token`.
    pub async fn run_stream(&self, message: &str, mut callbacks: StreamCallbacks<'_>, options: AgentOptions) -> Result<AgentResponse> {
        let start = Instant::now();
        info!(agent_id = %self.agent_id, "agent.start");

        let system_prompt = self.build_system_prompt().await;
        let memory_block = self.recall_memory_block(message).await;
        let full_message = if memory_block.is_empty() {
            message.to_string()
        } else {
            format!("{memory_block}{message}")
        };

        let model = self.resolve_model(&options);
        let temperature = self.resolve_temperature(&options);
        let max_iterations = options.max_tool_iterations.unwrap_or(DEFAULT_MAX_TOOL_ITERATIONS);

        let mut current_message = full_message;
        let mut last_text = String::new();
        let mut iterations = 0;

        while iterations < max_iterations {
            let tools = self.tool_registry.list_specs();
            let is_final_pass_candidate = iterations + 1 >= max_iterations;

            let call_start = Instant::now();
            let response_text = if is_final_pass_candidate {
                let on_token = &mut callbacks.on_token;
                let chunk_cb: OnChunk<'_> = Box::new(|chunk| {
                    if let StreamChunk::Token(t) = chunk {
                        on_token(&t);
                    }
                });
                match self
                    .provider
                    .chat_with_system_stream(Some(&system_prompt), &current_message, &model, temperature, chunk_cb)
                    .await
                {
                    Ok(text) => {
                        self.health.record_success(self.provider.name(), call_start.elapsed().as_millis() as u64);
                        text
                    }
                    Err(e) => {
                        self.health.record_error(self.provider.name(), &e);
                        (callbacks.on_error)(&e.to_string());
                        return Err(e);
                    }
                }
            } else {
                match self
                    .provider
                    .chat_with_system_tools(Some(&system_prompt), &current_message, &model, temperature, &tools)
                    .await
                {
                    Ok(text) => {
                        self.health.record_success(self.provider.name(), call_start.elapsed().as_millis() as u64);
                        text
                    }
                    Err(e) => {
                        self.health.record_error(self.provider.name(), &e);
                        (callbacks.on_error)(&e.to_string());
                        return Err(e);
                    }
                }
            };

            let mut parser = StreamToolParser::new();
            parser.feed(&response_text);
            let calls = parser.finish();

            if calls.is_empty() {
                last_text = response_text;
                break;
            }

            let ctx = self.tool_context(&options, self.provider.name());
            let requests: Vec<ToolCallRequest> = calls
                .iter()
                .map(|c| ToolCallRequest { id: c.id.clone(), name: c.name.clone(), arguments: c.arguments.clone() })
                .collect();
            let results = self.executor.execute_batch(requests, ctx).await;

            let mut tool_summary = String::from("\n\n## Tool results\n");
            for result in &results {
                tool_summary.push_str(&format!("- {} ({}): {}\n", result.name, result.success, result.output));
            }
            current_message = format!("{response_text}{tool_summary}");
            last_text = response_text;
            iterations += 1;
        }

        self.maybe_store_turn(message, &last_text).await;

        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(agent_id = %self.agent_id, elapsed_ms, iterations, "agent.end");

        let response = AgentResponse { text: last_text, tool_iterations: iterations, elapsed_ms };
        (callbacks.on_done)(&response);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ghostclaw_security::{ToolCallResult, Tool};
    use std::collections::HashMap as Map;

    struct StubProvider;

    #[async_trait]
    impl Provider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }
        async fn chat_with_system(&self, _: Option<&str>, message: &str, _: &str, _: f32) -> Result<String> {
            Ok(format!("reply to: {message}"))
        }
    }

    fn engine(memory: Option<Arc<dyn Memory>>, auto_save: bool) -> AgentEngine {
        let provider: Arc<dyn Provider> = Arc::new(StubProvider);
        let registry = Arc::new(ToolRegistry::new());
        let executor = Arc::new(ToolExecutor::new(registry.clone(), None, None));
        AgentEngine::new(provider, registry, executor, memory, "/tmp/ghostclaw-test", "gpt-4o-mini", 0.7, auto_save, false, "ghostclaw")
    }

    #[tokio::test]
    async fn run_returns_final_text_when_no_tool_calls() {
        let e = engine(None, false);
        let resp = e.run("hello", AgentOptions::default()).await.unwrap();
        assert!(resp.text.contains("reply to: hello"));
        assert_eq!(resp.tool_iterations, 0);
    }

    #[test]
    fn resolve_temperature_applies_thinking_override() {
        let e = engine(None, false);
        let opts = AgentOptions { thinking: Some(ThinkingLevel::High), ..Default::default() };
        assert_eq!(e.resolve_temperature(&opts), 0.9);
    }

    #[test]
    fn resolve_model_prefers_override() {
        let e = engine(None, false);
        let opts = AgentOptions { model_override: Some("custom-model".to_string()), ..Default::default() };
        assert_eq!(e.resolve_model(&opts), "custom-model");
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes input"
        }
        async fn execute(&self, arguments: &Map<String, String>, _ctx: &ToolContext) -> ToolCallResult {
            ToolCallResult::ok("1", "echo", arguments.get("value").cloned().unwrap_or_default())
        }
    }

    struct ToolCallingProvider;

    #[async_trait]
    impl Provider for ToolCallingProvider {
        fn name(&self) -> &str {
            "tool-stub"
        }
        async fn chat_with_system(&self, _: Option<&str>, message: &str, _: &str, _: f32) -> Result<String> {
            if message.contains("Tool results") {
                Ok("done".to_string())
            } else {
                Ok(r#"{"tool_calls":[{"id":"1","type":"function","function":{"name":"echo","arguments":"{\"value\":\"hi\"}"}}]}"#.to_string())
            }
        }
    }

    #[tokio::test]
    async fn run_executes_tool_calls_before_finishing() {
        let provider: Arc<dyn Provider> = Arc::new(ToolCallingProvider);
        let registry = Arc::new(ToolRegistry::new());
        registry.register(Arc::new(EchoTool));
        let executor = Arc::new(ToolExecutor::new(registry.clone(), None, None));
        let e = AgentEngine::new(provider, registry, executor, None, "/tmp/ghostclaw-test2", "m", 0.7, false, false, "ghostclaw");
        let resp = e.run("use the echo tool", AgentOptions::default()).await.unwrap();
        assert_eq!(resp.text, "done");
        assert_eq!(resp.tool_iterations, 1);
    }
}
