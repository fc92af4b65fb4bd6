use thiserror::Error;

/// Policy error taxonomy (§7): path escape, disallowed command, autonomy
/// violation, rate-limit exceeded, forbidden path.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("path escape")]
    PathEscape,
    #[error("disallowed command: {0}")]
    DisallowedCommand(String),
    #[error("autonomy violation: {0}")]
    AutonomyViolation(String),
    #[error("rate-limit exceeded")]
    RateLimitExceeded,
    #[error("forbidden path: {0}")]
    ForbiddenPath(String),
}

pub type Result<T> = std::result::Result<T, PolicyError>;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("tool in cooldown: {0}")]
    Cooldown(String),
    #[error("tool blocked by policy ({blocker}): {reason}")]
    BlockedByPolicy { blocker: String, reason: String },
    #[error("tool execution denied by approval policy")]
    ApprovalDenied,
    #[error("sandbox error: {0}")]
    Sandbox(String),
}
