//! Tool executor (C12): parallel dispatch, cooldown circuit breaker, policy
//! gates, sandbox resolution, approval.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::future::join_all;
use tracing::{info, warn};

use crate::approval::ApprovalManager;
use crate::registry::{ToolCallRequest, ToolCallResult, ToolContext, ToolRegistry};
use crate::tool_policy::{PolicyRequest, ToolPolicyPipeline};

const FAILURE_THRESHOLD: u32 = 3;
const COOLDOWN: Duration = Duration::from_secs(30);

/// Resolves and prepares a sandboxed runtime for a tool call. The actual
/// sandbox (containers, CDP, etc.) lives outside the core; this trait is
/// the seam the executor calls through when `sandbox_enabled` is set.
#[async_trait]
pub trait SandboxManager: Send + Sync {
    async fn resolve_runtime(&self, request: &ToolCallRequest) -> Result<(), String>;
    async fn ensure_runtime(&self, request: &ToolCallRequest) -> Result<(), String>;
}

/// No sandboxing — every call is accepted immediately.
pub struct NoopSandbox;

#[async_trait]
impl SandboxManager for NoopSandbox {
    async fn resolve_runtime(&self, _request: &ToolCallRequest) -> Result<(), String> {
        Ok(())
    }
    async fn ensure_runtime(&self, _request: &ToolCallRequest) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Default)]
struct BreakerState {
    failure_count: u32,
    cooldown_until: Option<Instant>,
}

/// Per-tool failure counters and cooldown deadlines, all behind one mutex
/// (§4.5 Circuit breaker; §5 Shared resources).
#[derive(Default)]
struct Breaker {
    state: Mutex<HashMap<String, BreakerState>>,
}

impl Breaker {
    /// Returns `Some(remaining)` if the tool is currently in cooldown.
    fn check(&self, tool_name: &str) -> Option<()> {
        let state = self.state.lock().expect("breaker mutex poisoned");
        let entry = state.get(tool_name)?;
        let deadline = entry.cooldown_until?;
        if Instant::now() < deadline {
            Some(())
        } else {
            None
        }
    }

    fn record_success(&self, tool_name: &str) {
        let mut state = self.state.lock().expect("breaker mutex poisoned");
        state.entry(tool_name.to_string()).or_default().failure_count = 0;
        if let Some(entry) = state.get_mut(tool_name) {
            entry.cooldown_until = None;
        }
    }

    fn record_failure(&self, tool_name: &str) {
        let mut state = self.state.lock().expect("breaker mutex poisoned");
        let entry = state.entry(tool_name.to_string()).or_default();
        entry.failure_count += 1;
        if entry.failure_count >= FAILURE_THRESHOLD {
            entry.cooldown_until = Some(Instant::now() + COOLDOWN);
        }
    }
}

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    tool_policy: Option<Arc<ToolPolicyPipeline>>,
    approval: Option<Arc<ApprovalManager>>,
    sandbox: Arc<dyn SandboxManager>,
    breaker: Arc<Breaker>,
}

impl ToolExecutor {
    pub fn new(
        registry: Arc<ToolRegistry>,
        tool_policy: Option<Arc<ToolPolicyPipeline>>,
        approval: Option<Arc<ApprovalManager>>,
    ) -> Self {
        Self {
            registry,
            tool_policy,
            approval,
            sandbox: Arc::new(NoopSandbox),
            breaker: Arc::new(Breaker::default()),
        }
    }

    pub fn with_sandbox(mut self, sandbox: Arc<dyn SandboxManager>) -> Self {
        self.sandbox = sandbox;
        self
    }

    /// One task per call, dispatched in parallel; one result per request in
    /// the same order as input (§4.5 Scheduling).
    pub async fn execute_batch(&self, requests: Vec<ToolCallRequest>, ctx: ToolContext) -> Vec<ToolCallResult> {
        let futures = requests.into_iter().map(|request| {
            let registry = self.registry.clone();
            let tool_policy = self.tool_policy.clone();
            let approval = self.approval.clone();
            let sandbox = self.sandbox.clone();
            let breaker = self.breaker.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                execute_one(request, &ctx, registry, tool_policy, approval, sandbox, breaker).await
            })
        });

        join_all(futures)
            .await
            .into_iter()
            .map(|joined| joined.unwrap_or_else(|e| {
                ToolCallResult::fail("unknown", "unknown", format!("tool task panicked: {e}"))
            }))
            .collect()
    }
}

async fn execute_one(
    request: ToolCallRequest,
    ctx: &ToolContext,
    registry: Arc<ToolRegistry>,
    tool_policy: Option<Arc<ToolPolicyPipeline>>,
    approval: Option<Arc<ApprovalManager>>,
    sandbox: Arc<dyn SandboxManager>,
    breaker: Arc<Breaker>,
) -> ToolCallResult {
    // 1. Tool policy.
    let group = registry.lookup(&request.name).map(|t| t.group().to_string()).unwrap_or_default();
    if let Some(pipeline) = &tool_policy {
        let policy_request = PolicyRequest {
            tool_name: &request.name,
            tool_group: &group,
            session_id: &ctx.session_id,
            agent_id: &ctx.agent_id,
            channel_id: &ctx.channel_id,
        };
        let decision = pipeline.evaluate(&policy_request);
        if !decision.allowed {
            return ToolCallResult::fail(
                &request.id,
                &request.name,
                format!(
                    "Tool blocked by policy ({}): {}",
                    decision.blocker.unwrap_or_default(),
                    decision.reason.unwrap_or_default()
                ),
            );
        }
    }

    // 2. Tool existence.
    let Some(tool) = registry.lookup(&request.name) else {
        return ToolCallResult::fail(&request.id, &request.name, format!("Unknown tool: {}", request.name));
    };

    // 3. Sandbox resolution.
    if ctx.sandbox_enabled {
        if let Err(e) = sandbox.resolve_runtime(&request).await {
            return ToolCallResult::fail(&request.id, &request.name, e);
        }
        if let Err(e) = sandbox.ensure_runtime(&request).await {
            return ToolCallResult::fail(&request.id, &request.name, e);
        }
    }

    // 4. Cooldown check.
    if breaker.check(&request.name).is_some() {
        warn!(tool = %request.name, "tool in cooldown, short-circuiting");
        return ToolCallResult::fail(&request.id, &request.name, format!("Tool in cooldown: {}", request.name));
    }

    // 5. Approval.
    if let Some(manager) = &approval {
        let approved = manager.check(&request.name, &group, tool.is_safe(), &ctx.session_id).await;
        if !approved {
            return ToolCallResult::fail(&request.id, &request.name, "Tool execution denied by approval policy");
        }
    }

    // 6. Execute.
    let result = tool.execute(&request.arguments, ctx).await;
    if result.success {
        breaker.record_success(&request.name);
    } else {
        breaker.record_failure(&request.name);
    }
    info!(tool = %request.name, success = result.success, "tool.exec");
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Tool;

    fn test_context() -> ToolContext {
        ToolContext {
            session_id: "s".to_string(),
            main_session_id: "s".to_string(),
            agent_id: "ghostclaw".to_string(),
            channel_id: "webhook".to_string(),
            group_id: None,
            tool_profile: None,
            workspace_path: "/tmp".to_string(),
            sandbox_enabled: false,
            provider: None,
        }
    }

    struct AlwaysFailTool;

    #[async_trait]
    impl Tool for AlwaysFailTool {
        fn name(&self) -> &str {
            "flaky"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        async fn execute(&self, _arguments: &HashMap<String, String>, _ctx: &ToolContext) -> ToolCallResult {
            ToolCallResult::fail("x", "flaky", "boom")
        }
    }

    #[tokio::test]
    async fn unknown_tool_surfaces_clear_error() {
        let registry = Arc::new(ToolRegistry::new());
        let executor = ToolExecutor::new(registry, None, None);
        let results = executor
            .execute_batch(
                vec![ToolCallRequest {
                    id: "1".to_string(),
                    name: "nope".to_string(),
                    arguments: HashMap::new(),
                }],
                test_context(),
            )
            .await;
        assert_eq!(results[0].output, "Unknown tool: nope");
    }

    #[tokio::test]
    async fn breaker_opens_after_three_consecutive_failures() {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(Arc::new(AlwaysFailTool));
        let executor = ToolExecutor::new(registry, None, None);

        for _ in 0..3 {
            let results = executor
                .execute_batch(
                    vec![ToolCallRequest {
                        id: "1".to_string(),
                        name: "flaky".to_string(),
                        arguments: HashMap::new(),
                    }],
                    test_context(),
                )
                .await;
            assert_eq!(results[0].output, "boom");
        }

        let results = executor
            .execute_batch(
                vec![ToolCallRequest {
                    id: "1".to_string(),
                    name: "flaky".to_string(),
                    arguments: HashMap::new(),
                }],
                test_context(),
            )
            .await;
        assert_eq!(results[0].output, "Tool in cooldown: flaky");
    }
}
