//! ghostclaw-gateway — the daemon's network surface (C19-C22): a
//! hand-rolled HTTP/1.1 server for `/health`, `/pair`, `/webhook`,
//! `/whatsapp`, a hand-rolled RFC 6455 WebSocket server for the streaming
//! `rpc`/`event` protocol, the shared RPC dispatcher, and process-wide
//! observability.

pub mod agent_run;
pub mod error;
pub mod http;
pub mod observability;
pub mod rpc;
pub mod session_lane;
pub mod state;
pub mod ws;
