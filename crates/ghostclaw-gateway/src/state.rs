//! Shared gateway state (C19-C21): wires the agent engine, session store,
//! pairing/send-policy, and the WS client hub together for both the HTTP
//! and WebSocket servers.

use std::sync::Mutex as StdMutex;
use std::sync::Arc;

use ghostclaw_agent::AgentEngine;
use ghostclaw_core::config::Config;
use ghostclaw_memory::Memory;
use ghostclaw_protocol::PairingState;
use ghostclaw_sessions::{SessionSendPolicy, SessionStore};

use crate::session_lane::SessionLanes;
use crate::ws::hub::WsHub;

pub struct GatewayState {
    pub config: Config,
    pub engine: Arc<AgentEngine>,
    pub sessions: Arc<SessionStore>,
    pub memory: Arc<dyn Memory>,
    pub send_policy: Option<Arc<SessionSendPolicy>>,
    pub pairing: Option<Arc<StdMutex<PairingState>>>,
    pub lanes: SessionLanes,
    pub ws_hub: WsHub,
    pub websocket_enabled: bool,
}

impl GatewayState {
    pub fn websocket_port(&self) -> Option<u16> {
        self.websocket_enabled.then_some(self.config.gateway.ws_port)
    }
}
