//! Tool policy pipeline (C10): a layered set of allow/deny rules applied
//! before executing a tool.

use std::collections::HashSet;

/// Context a policy rule evaluates against.
pub struct PolicyRequest<'a> {
    pub tool_name: &'a str,
    pub tool_group: &'a str,
    pub session_id: &'a str,
    pub agent_id: &'a str,
    pub channel_id: &'a str,
}

#[derive(Debug, Clone)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub blocker: Option<String>,
    pub reason: Option<String>,
}

impl PolicyDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            blocker: None,
            reason: None,
        }
    }

    pub fn deny(blocker: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            blocker: Some(blocker.into()),
            reason: Some(reason.into()),
        }
    }
}

/// A single layer in the pipeline. Layers run in registration order; the
/// first denial short-circuits the remaining layers.
pub trait PolicyRule: Send + Sync {
    fn name(&self) -> &str;
    fn evaluate(&self, request: &PolicyRequest<'_>) -> PolicyDecision;
}

/// Denies tools whose name appears in a configured deny set.
pub struct DenyListRule {
    name: String,
    denied_tools: HashSet<String>,
}

impl DenyListRule {
    pub fn new(name: impl Into<String>, denied_tools: impl IntoIterator<Item = String>) -> Self {
        Self {
            name: name.into(),
            denied_tools: denied_tools.into_iter().collect(),
        }
    }
}

impl PolicyRule for DenyListRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, request: &PolicyRequest<'_>) -> PolicyDecision {
        if self.denied_tools.contains(request.tool_name) {
            PolicyDecision::deny(&self.name, format!("{} is denied by policy", request.tool_name))
        } else {
            PolicyDecision::allow()
        }
    }
}

/// Denies an entire tool group (e.g. `"runtime"`) unless explicitly allowed.
pub struct GroupAllowlistRule {
    name: String,
    allowed_groups: HashSet<String>,
}

impl GroupAllowlistRule {
    pub fn new(name: impl Into<String>, allowed_groups: impl IntoIterator<Item = String>) -> Self {
        Self {
            name: name.into(),
            allowed_groups: allowed_groups.into_iter().collect(),
        }
    }
}

impl PolicyRule for GroupAllowlistRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, request: &PolicyRequest<'_>) -> PolicyDecision {
        if self.allowed_groups.is_empty() || self.allowed_groups.contains(request.tool_group) {
            PolicyDecision::allow()
        } else {
            PolicyDecision::deny(&self.name, format!("group '{}' not permitted", request.tool_group))
        }
    }
}

pub struct ToolPolicyPipeline {
    rules: Vec<Box<dyn PolicyRule>>,
}

impl ToolPolicyPipeline {
    pub fn new(rules: Vec<Box<dyn PolicyRule>>) -> Self {
        Self { rules }
    }

    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn evaluate(&self, request: &PolicyRequest<'_>) -> PolicyDecision {
        for rule in &self.rules {
            let decision = rule.evaluate(request);
            if !decision.allowed {
                return decision;
            }
        }
        PolicyDecision::allow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_denial_short_circuits() {
        let pipeline = ToolPolicyPipeline::new(vec![
            Box::new(DenyListRule::new("denylist", vec!["shell".to_string()])),
        ]);
        let req = PolicyRequest {
            tool_name: "shell",
            tool_group: "runtime",
            session_id: "s",
            agent_id: "a",
            channel_id: "c",
        };
        let decision = pipeline.evaluate(&req);
        assert!(!decision.allowed);
        assert_eq!(decision.blocker.as_deref(), Some("denylist"));
    }

    #[test]
    fn empty_pipeline_allows_everything() {
        let pipeline = ToolPolicyPipeline::empty();
        let req = PolicyRequest {
            tool_name: "read_file",
            tool_group: "fs",
            session_id: "s",
            agent_id: "a",
            channel_id: "c",
        };
        assert!(pipeline.evaluate(&req).allowed);
    }
}
