//! ghostclaw-core — shared result/status types, configuration, the session
//! key grammar, and the thin HTTP client contract used by the rest of the
//! GhostClaw agent runtime core.

pub mod config;
pub mod error;
pub mod http;
pub mod types;

pub use config::Config;
pub use error::{CoreError, Result, Status};
pub use types::{ConnId, SessionKey, ThinkingLevel};
