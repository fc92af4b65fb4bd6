//! Gateway error type (C19-C21): maps onto HTTP status codes and WS error
//! codes per §7's status mapping.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found")]
    NotFound,

    #[error("request too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("locked out, retry after {retry_after_secs}s")]
    LockedOut { retry_after_secs: u64 },

    #[error("session rate limited")]
    RateLimited,

    #[error("agent unavailable")]
    AgentUnavailable,

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Short error kind sent to HTTP/WS clients (§7).
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::BadRequest(_) => "invalid_request",
            GatewayError::Unauthorized => "unauthorized",
            GatewayError::Forbidden(_) => "forbidden",
            GatewayError::NotFound => "not_found",
            GatewayError::PayloadTooLarge { .. } => "request_too_large",
            GatewayError::LockedOut { .. } => "locked_out",
            GatewayError::RateLimited => "session_rate_limited",
            GatewayError::AgentUnavailable => "agent_unavailable",
            GatewayError::Internal(_) => "internal",
        }
    }

    /// HTTP status code for this error (§4.8).
    pub fn status(&self) -> u16 {
        match self {
            GatewayError::BadRequest(_) => 400,
            GatewayError::Unauthorized => 401,
            GatewayError::Forbidden(_) => 403,
            GatewayError::NotFound => 404,
            GatewayError::PayloadTooLarge { .. } => 413,
            GatewayError::LockedOut { .. } => 429,
            GatewayError::RateLimited => 429,
            GatewayError::AgentUnavailable => 500,
            GatewayError::Internal(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
