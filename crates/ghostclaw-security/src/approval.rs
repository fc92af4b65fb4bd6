//! Approval manager (C10): interactive confirmation for dangerous tools.

use async_trait::async_trait;

const DANGEROUS_NAMES: &[&str] = &["shell", "exec", "process"];

/// A tool is "dangerous" iff it isn't marked safe, belongs to the `runtime`
/// group, or is one of the hardcoded dangerous names (§4.5 step 5).
pub fn is_dangerous(tool_name: &str, tool_group: &str, is_safe: bool) -> bool {
    !is_safe || tool_group == "runtime" || DANGEROUS_NAMES.contains(&tool_name)
}

/// Approval sink — the actual UI/channel that asks a human to confirm is an
/// external collaborator; the core only defines the contract.
#[async_trait]
pub trait ApprovalSink: Send + Sync {
    async fn request_approval(&self, tool_name: &str, session_id: &str) -> bool;
}

/// Approves everything without prompting — used when no interactive sink is
/// wired up but an `ApprovalManager` is still required by the executor.
pub struct AutoApprove;

#[async_trait]
impl ApprovalSink for AutoApprove {
    async fn request_approval(&self, _tool_name: &str, _session_id: &str) -> bool {
        true
    }
}

pub struct ApprovalManager {
    sink: Box<dyn ApprovalSink>,
}

impl ApprovalManager {
    pub fn new(sink: Box<dyn ApprovalSink>) -> Self {
        Self { sink }
    }

    pub async fn check(&self, tool_name: &str, tool_group: &str, is_safe: bool, session_id: &str) -> bool {
        if !is_dangerous(tool_name, tool_group, is_safe) {
            return true;
        }
        self.sink.request_approval(tool_name, session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_is_always_dangerous() {
        assert!(is_dangerous("shell", "fs", true));
    }

    #[test]
    fn runtime_group_is_dangerous() {
        assert!(is_dangerous("anything", "runtime", true));
    }

    #[test]
    fn unsafe_tool_is_dangerous() {
        assert!(is_dangerous("custom_tool", "misc", false));
    }

    #[test]
    fn safe_non_runtime_tool_is_not_dangerous() {
        assert!(!is_dangerous("read_file", "fs", true));
    }

    #[tokio::test]
    async fn auto_approve_sink_always_approves() {
        let manager = ApprovalManager::new(Box::new(AutoApprove));
        assert!(manager.check("shell", "runtime", true, "session-1").await);
    }
}
