use thiserror::Error;

/// Uniform fail-typed error surfaced across the core (C1).
///
/// Crate-local enums (`ProviderError`, `MemoryError`, `SessionError`,
/// `PolicyError`, `ToolError`, `GatewayError`) carry the detail each domain
/// needs; this enum is the shared bottom type for errors that cross crate
/// boundaries without a more specific home.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("request too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Short error kind sent to HTTP/WS clients — see §7's status mapping.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Config(_) => "invalid_request",
            CoreError::PayloadTooLarge { .. } => "request_too_large",
            CoreError::Timeout { .. } => "internal",
            CoreError::Serialization(_) => "invalid_request",
            CoreError::Io(_) => "internal",
            CoreError::Internal(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Unit-ish ok/err used where callers only care whether an operation
/// succeeded, not any returned value (C1 `Status`).
pub type Status = std::result::Result<(), CoreError>;
