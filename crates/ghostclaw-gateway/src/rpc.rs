//! RPC method handler (C21): `agent.run` plus the read-only session/config/
//! health methods dispatched over the WS `rpc` envelope (§4.10).

use ghostclaw_core::types::SessionKey;
use ghostclaw_protocol::methods;
use serde_json::{json, Value};

use crate::agent_run::{run_agent_turn, AgentTurnRequest, RpcEmitTarget};
use crate::error::{GatewayError, Result};
use crate::observability::{self, ComponentStatus};
use crate::state::GatewayState;

fn str_field(params: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    params.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}

fn f32_field(params: &serde_json::Map<String, Value>, key: &str) -> Option<f32> {
    params.get(key).and_then(|v| v.as_f64()).map(|v| v as f32)
}

async fn handle_agent_run(state: &GatewayState, params: &serde_json::Map<String, Value>, emit_target: Option<RpcEmitTarget<'_>>) -> Result<Value> {
    let message = str_field(params, "message").ok_or_else(|| GatewayError::BadRequest("missing message".to_string()))?;

    let agent_id = str_field(params, "agent_id").unwrap_or_else(|| "ghostclaw".to_string());
    let channel = str_field(params, "channel").unwrap_or_else(|| "ws".to_string());
    let peer_id = str_field(params, "peer_id").unwrap_or_else(|| "default".to_string());
    let raw_session = str_field(params, "session_id");
    let session_key = match raw_session {
        Some(raw) => SessionKey::normalize(&raw, &agent_id, &channel),
        None => SessionKey::new(agent_id, channel.clone(), peer_id),
    };

    let provenance = str_field(params, "input_provenance_kind").map(|kind| ghostclaw_sessions::InputProvenance {
        kind,
        source_session_id: str_field(params, "input_provenance_source_session_id"),
        source_channel: str_field(params, "input_provenance_source_channel"),
        source_tool: str_field(params, "input_provenance_source_tool"),
        source_message_id: str_field(params, "input_provenance_source_message_id"),
    });

    let request = AgentTurnRequest {
        message,
        session_key,
        model: str_field(params, "model"),
        thinking_level: str_field(params, "thinking_level"),
        group_id: str_field(params, "group_id"),
        temperature: f32_field(params, "temperature"),
        channel: "ws".to_string(),
        provenance,
    };

    let result = run_agent_turn(state, request, state.websocket_enabled, emit_target).await?;

    let mut payload = json!({
        "content": result.content,
        "duration_ms": result.duration_ms,
        "tool_calls": result.tool_calls,
        "session_id": result.session_id,
        "model": result.model,
        "thinking_level": result.thinking_level,
    });
    if let Some(group_id) = result.group_id {
        payload["group_id"] = json!(group_id);
    }
    Ok(payload)
}

fn handle_config_get(state: &GatewayState, params: &serde_json::Map<String, Value>) -> Result<Value> {
    let key = str_field(params, "key").ok_or_else(|| GatewayError::BadRequest("missing key".to_string()))?;
    if !methods::CONFIG_GET_ALLOWED_KEYS.contains(&key.as_str()) {
        return Err(GatewayError::Forbidden(format!("key '{key}' is not allow-listed")));
    }
    let value = match key.as_str() {
        "default_provider" => state.config.default_provider.clone(),
        "default_model" => state.config.default_model.clone(),
        "memory.backend" => state.config.memory.backend.clone(),
        "gateway.host" => state.config.gateway.bind.clone(),
        _ => unreachable!("checked against allow-list above"),
    };
    Ok(json!({"key": key, "value": value}))
}

fn handle_session_list(state: &GatewayState) -> Result<Value> {
    let sessions = state.sessions.list_all();
    let mut payload = serde_json::Map::new();
    payload.insert("count".to_string(), json!(sessions.len()));
    for (i, key) in sessions.iter().enumerate() {
        payload.insert(format!("session_{i}"), json!(key.format()));
    }
    Ok(Value::Object(payload))
}

fn handle_session_history(state: &GatewayState, params: &serde_json::Map<String, Value>) -> Result<Value> {
    let session_id = str_field(params, "session_id").ok_or_else(|| GatewayError::BadRequest("missing session_id".to_string()))?;
    let key = SessionKey::parse(&session_id).ok_or_else(|| GatewayError::BadRequest("invalid session_id".to_string()))?;
    let limit = params.get("limit").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
    let entries = state.sessions.load_transcript(&key, limit).map_err(|e| GatewayError::Internal(e.to_string()))?;

    let entries_json: Vec<Value> = entries
        .iter()
        .map(|e| {
            json!({
                "role": e.role,
                "content": e.content,
                "timestamp": e.timestamp,
                "model": e.model,
                "metadata": e.metadata,
                "input_provenance": e.input_provenance,
            })
        })
        .collect();

    let last = entries.last();
    Ok(json!({
        "session_id": session_id,
        "entries_json": entries_json,
        "count": entries.len(),
        "last_role": last.map(|e| e.role),
        "last_content": last.map(|e| e.content.clone()),
    }))
}

fn handle_session_override_set(state: &GatewayState, params: &serde_json::Map<String, Value>) -> Result<Value> {
    let session_id = str_field(params, "session_id").ok_or_else(|| GatewayError::BadRequest("missing session_id".to_string()))?;
    let key = SessionKey::parse(&session_id).ok_or_else(|| GatewayError::BadRequest("invalid session_id".to_string()))?;
    let mut current = state.sessions.get_or_create_override(&key);

    if let Some(model) = str_field(params, "model") {
        current.model = Some(model);
    }
    if let Some(level) = str_field(params, "thinking_level") {
        current.thinking_level = ghostclaw_core::types::ThinkingLevel::parse(&level);
    }
    if let Some(delivery) = str_field(params, "delivery_context") {
        current.delivery_context = Some(delivery);
    }
    if let Some(group) = str_field(params, "group_id") {
        current.group_id = Some(group);
    }

    state.sessions.set_override(&key, current.clone());
    Ok(json!({
        "session_id": session_id,
        "model": current.model,
        "thinking_level": current.thinking_level,
        "delivery_context": current.delivery_context,
        "group_id": current.group_id,
    }))
}

fn handle_session_override_get(state: &GatewayState, params: &serde_json::Map<String, Value>) -> Result<Value> {
    let session_id = str_field(params, "session_id").ok_or_else(|| GatewayError::BadRequest("missing session_id".to_string()))?;
    let key = SessionKey::parse(&session_id).ok_or_else(|| GatewayError::BadRequest("invalid session_id".to_string()))?;
    let current = state.sessions.get_or_create_override(&key);
    Ok(json!({
        "session_id": session_id,
        "model": current.model,
        "thinking_level": current.thinking_level,
        "delivery_context": current.delivery_context,
        "group_id": current.group_id,
    }))
}

fn handle_session_group_list(state: &GatewayState, params: &serde_json::Map<String, Value>) -> Result<Value> {
    let group_id = str_field(params, "group_id").ok_or_else(|| GatewayError::BadRequest("missing group_id".to_string()))?;
    let members = state.sessions.list_by_group(&group_id);
    Ok(json!({"group_id": group_id, "sessions": members.iter().map(|k| k.format()).collect::<Vec<_>>()}))
}

async fn handle_health(state: &GatewayState) -> Value {
    let memory_ok = state.memory.health_check().await;
    observability::set_component_status("memory", if memory_ok { ComponentStatus::Ok } else { ComponentStatus::Degraded });
    json!({
        "status": "ok",
        "provider": state.config.default_provider,
        "provider_health": state.engine.health_snapshot(),
        "memory": if memory_ok { "ok" } else { "degraded" },
    })
}

/// Dispatch one RPC call. `emit_target` is `Some` only for `agent.run`
/// invoked over the WS transport, giving it a channel to stream
/// `rpc.event` progress frames back to the calling client.
pub async fn dispatch(state: &GatewayState, method: &str, params: &serde_json::Map<String, Value>, emit_target: Option<RpcEmitTarget<'_>>) -> Result<Value> {
    match method {
        methods::AGENT_RUN => handle_agent_run(state, params, emit_target).await,
        methods::CONFIG_GET => handle_config_get(state, params),
        methods::SESSION_LIST => handle_session_list(state),
        methods::SESSION_HISTORY => handle_session_history(state, params),
        methods::SESSION_OVERRIDE_SET => handle_session_override_set(state, params),
        methods::SESSION_OVERRIDE_GET => handle_session_override_get(state, params),
        methods::SESSION_GROUP_LIST => handle_session_group_list(state, params),
        methods::HEALTH => Ok(handle_health(state).await),
        other => Err(GatewayError::BadRequest(format!("unknown rpc method: {other}"))),
    }
}
