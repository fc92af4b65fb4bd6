//! Shared agent-turn pipeline (§4.8, §4.10): session bookkeeping, the
//! per-session lane, and the provider call, used by both the REST
//! `/webhook` handler and the WS `agent.run` RPC method. The two callers
//! differ only in the wire shape of the final response (`response` vs.
//! `content`) and in whether mid-flight tokens are also echoed back
//! directly to the calling WS client — both kept exactly as specified.

use std::collections::HashMap;

use ghostclaw_agent::engine::{AgentOptions, StreamCallbacks};
use ghostclaw_core::types::{SessionKey, ThinkingLevel};
use ghostclaw_protocol::ServerFrame;
use ghostclaw_sessions::{InputProvenance, Role, TranscriptEntry};
use serde_json::json;

use crate::error::{GatewayError, Result};
use crate::observability;
use crate::state::GatewayState;
use crate::ws::hub::WsHub;

pub struct AgentTurnRequest {
    pub message: String,
    pub session_key: SessionKey,
    pub model: Option<String>,
    pub thinking_level: Option<String>,
    pub group_id: Option<String>,
    pub temperature: Option<f32>,
    pub channel: String,
    pub provenance: Option<InputProvenance>,
}

pub struct AgentTurnResponse {
    pub content: String,
    pub duration_ms: u64,
    pub tool_calls: u32,
    pub session_id: String,
    pub model: String,
    pub thinking_level: String,
    pub group_id: Option<String>,
}

/// Identifies the WS client an in-flight RPC call should also receive
/// direct `rpc.event` progress frames on, in addition to the broadcast
/// `event` every session subscriber receives.
pub struct RpcEmitTarget<'a> {
    pub hub: &'a WsHub,
    pub conn_id: &'a str,
    pub rpc_id: &'a str,
}

pub async fn run_agent_turn(
    state: &GatewayState,
    request: AgentTurnRequest,
    stream: bool,
    emit_target: Option<RpcEmitTarget<'_>>,
) -> Result<AgentTurnResponse> {
    let session_id = request.session_key.format();

    if let Some(policy) = &state.send_policy {
        if !policy.try_acquire(&request.session_key) {
            return Err(GatewayError::RateLimited);
        }
    }

    let mut session_state = state.sessions.get_or_create_override(&request.session_key);

    let model = request.model.clone().unwrap_or_else(|| session_state.model.clone().unwrap_or_else(|| state.config.default_model.clone()));
    let thinking_level = match &request.thinking_level {
        Some(raw) => ThinkingLevel::parse(raw),
        None => session_state.thinking_level,
    };
    let group_id = request.group_id.clone().or_else(|| session_state.group_id.clone());

    let mut user_metadata = HashMap::new();
    user_metadata.insert("channel".to_string(), request.channel.clone());
    user_metadata.insert("thinking_level".to_string(), thinking_level.as_str().to_string());
    if let Some(group) = &group_id {
        user_metadata.insert("group_id".to_string(), group.clone());
    }
    let mut user_entry = TranscriptEntry::new(Role::User, request.message.clone());
    user_entry.metadata = user_metadata;
    user_entry.input_provenance = request.provenance.clone();
    let _ = state.sessions.append_transcript(&request.session_key, &user_entry);

    observability::record_channel_message(&request.channel, "inbound");

    let (_lane_guard, contended) = state.lanes.acquire(&session_id).await;
    if contended {
        state.ws_hub.publish_session_event(&session_id, json!({"type": "assistant.queued"}));
    }
    state.ws_hub.publish_session_event(&session_id, json!({"type": "assistant.start"}));

    let options = AgentOptions {
        model_override: Some(model.clone()),
        temperature_override: request.temperature,
        thinking: Some(thinking_level),
        session_id: Some(session_id.clone()),
        agent_id: Some(request.session_key.agent_id.clone()),
        channel_id: Some(request.session_key.channel_id.clone()),
        group_id: group_id.clone(),
        ..Default::default()
    };

    let run_result = if stream {
        let hub = &state.ws_hub;
        let sid = session_id.clone();
        let target = emit_target;
        let on_token = |token: &str| {
            let payload = json!({"type": "assistant.token", "token": token});
            if let Some(t) = &target {
                t.hub.send_to(t.conn_id, &ServerFrame::rpc_event(t.rpc_id, &sid, payload.clone()));
            }
            hub.publish_session_event(&sid, payload);
        };
        let on_done = |_resp: &ghostclaw_agent::engine::AgentResponse| {};
        let on_error = |_message: &str| {};
        let callbacks = StreamCallbacks { on_token: Box::new(on_token), on_done: Box::new(on_done), on_error: Box::new(on_error) };
        state.engine.run_stream(&request.message, callbacks, options).await
    } else {
        state.engine.run(&request.message, options).await
    };

    let response = match run_result {
        Ok(resp) => resp,
        Err(e) => {
            state.ws_hub.publish_session_event(&session_id, json!({"type": "assistant.error", "error": e.to_string()}));
            let mut failure = TranscriptEntry::new(Role::System, format!("agent run failed: {e}"));
            failure.metadata.insert("channel".to_string(), request.channel.clone());
            let _ = state.sessions.append_transcript(&request.session_key, &failure);
            return Err(GatewayError::Internal(e.to_string()));
        }
    };

    state.ws_hub.publish_session_event(
        &session_id,
        json!({"type": "assistant.done", "duration_ms": response.elapsed_ms, "tool_calls": response.tool_iterations}),
    );

    let mut assistant_metadata = HashMap::new();
    assistant_metadata.insert("duration_ms".to_string(), response.elapsed_ms.to_string());
    assistant_metadata.insert("tool_calls".to_string(), response.tool_iterations.to_string());
    assistant_metadata.insert("thinking_level".to_string(), thinking_level.as_str().to_string());
    if let Some(group) = &group_id {
        assistant_metadata.insert("group_id".to_string(), group.clone());
    }
    let mut assistant_entry = TranscriptEntry::new(Role::Assistant, response.text.clone());
    assistant_entry.model = Some(model.clone());
    assistant_entry.metadata = assistant_metadata;
    let _ = state.sessions.append_transcript(&request.session_key, &assistant_entry);

    session_state.model = Some(model.clone());
    session_state.thinking_level = thinking_level;
    session_state.group_id = group_id.clone();
    state.sessions.set_override(&request.session_key, session_state);

    observability::record_channel_message(&request.channel, "outbound");

    Ok(AgentTurnResponse {
        content: response.text,
        duration_ms: response.elapsed_ms,
        tool_calls: response.tool_iterations,
        session_id,
        model,
        thinking_level: thinking_level.as_str().to_string(),
        group_id,
    })
}
