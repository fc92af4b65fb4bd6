//! RPC method name constants dispatched by C21.

pub const AGENT_RUN: &str = "agent.run";
pub const CONFIG_GET: &str = "config.get";
pub const SESSION_LIST: &str = "session.list";
pub const SESSION_HISTORY: &str = "session.history";
pub const SESSION_OVERRIDE_SET: &str = "session.override.set";
pub const SESSION_OVERRIDE_GET: &str = "session.override.get";
pub const SESSION_GROUP_LIST: &str = "session.group.list";
pub const HEALTH: &str = "health";

/// Allow-listed keys for `config.get` (§4.10).
pub const CONFIG_GET_ALLOWED_KEYS: &[&str] = &[
    "default_provider",
    "default_model",
    "memory.backend",
    "gateway.host",
];
