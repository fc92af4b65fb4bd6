//! End-to-end coverage of the hand-rolled HTTP/1.1 server (C19): real
//! `TcpStream`s against a `GatewayState` backed by a stub provider and a
//! markdown memory store in a temp workspace.

use std::sync::Arc;

use async_trait::async_trait;
use ghostclaw_agent::{AgentEngine, Provider};
use ghostclaw_core::config::Config;
use ghostclaw_gateway::http;
use ghostclaw_gateway::session_lane::SessionLanes;
use ghostclaw_gateway::state::GatewayState;
use ghostclaw_gateway::ws::hub::WsHub;
use ghostclaw_memory::markdown_store::MarkdownMemory;
use ghostclaw_protocol::PairingState;
use ghostclaw_security::{ApprovalManager, AutoApprove, ToolExecutor, ToolRegistry};
use ghostclaw_sessions::SessionStore;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

struct StubProvider;

#[async_trait]
impl Provider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }
    async fn chat_with_system(&self, _system: Option<&str>, message: &str, _model: &str, _temperature: f32) -> ghostclaw_agent::provider::Result<String> {
        Ok(format!("echo: {message}"))
    }
}

fn test_state(http_port: u16, ws_port: u16, workspace: &std::path::Path) -> Arc<GatewayState> {
    let mut config = Config::default();
    config.gateway.http_port = http_port;
    config.gateway.ws_port = ws_port;
    config.gateway.require_pairing = true;
    config.gateway.paired_tokens = vec!["preshared-token".to_string()];
    config.memory.workspace_dir = workspace.to_string_lossy().to_string();

    let memory = Arc::new(MarkdownMemory::new(workspace).expect("markdown memory"));
    let provider: Arc<dyn Provider> = Arc::new(StubProvider);
    let tool_registry = Arc::new(ToolRegistry::new());
    let approval = Arc::new(ApprovalManager::new(Box::new(AutoApprove)));
    let executor = Arc::new(ToolExecutor::new(tool_registry.clone(), None, Some(approval)));
    let engine = Arc::new(AgentEngine::new(
        provider,
        tool_registry,
        executor,
        Some(memory.clone()),
        workspace.to_string_lossy().to_string(),
        config.default_model.clone(),
        config.default_temperature,
        false,
        false,
        "ghostclaw",
    ));
    let sessions = Arc::new(SessionStore::new(workspace).expect("session store"));
    let pairing = Some(Arc::new(std::sync::Mutex::new(PairingState::new(5, &config.gateway.paired_tokens))));

    Arc::new(GatewayState {
        config,
        engine,
        sessions,
        memory,
        send_policy: None,
        pairing,
        lanes: SessionLanes::new(),
        ws_hub: WsHub::new(16),
        websocket_enabled: false,
    })
}

async fn send_request(port: u16, raw: &str) -> String {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.expect("connect");
    stream.write_all(raw.as_bytes()).await.expect("write");
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.expect("read");
    String::from_utf8_lossy(&buf).into_owned()
}

#[tokio::test]
async fn health_endpoint_reports_ok_status() {
    let workspace = tempfile::tempdir().unwrap();
    let port = 18787;
    let state = test_state(port, 18788, workspace.path());
    tokio::spawn(http::server::serve(state));
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let response = send_request(port, "GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains("\"status\""));
    assert!(response.contains("\"gateway\""));
}

#[tokio::test]
async fn unknown_path_returns_404() {
    let workspace = tempfile::tempdir().unwrap();
    let port = 18789;
    let state = test_state(port, 18790, workspace.path());
    tokio::spawn(http::server::serve(state));
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let response = send_request(port, "GET /nope HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 404"));
}

#[tokio::test]
async fn oversized_request_is_rejected_with_413() {
    let workspace = tempfile::tempdir().unwrap();
    let port = 18791;
    let state = test_state(port, 18792, workspace.path());
    tokio::spawn(http::server::serve(state));
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let oversized_len = ghostclaw_core::config::MAX_BODY_BYTES + 1;
    let body = "a".repeat(oversized_len);
    let raw = format!("POST /webhook HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}", body.len(), body);
    let response = send_request(port, &raw).await;
    assert!(response.starts_with("HTTP/1.1 413"));
}

#[tokio::test]
async fn pair_endpoint_rejects_wrong_code_and_accepts_right_one() {
    let workspace = tempfile::tempdir().unwrap();
    let port = 18793;
    let state = test_state(port, 18794, workspace.path());
    let correct_code = state.pairing.as_ref().unwrap().lock().unwrap().code().to_string();
    tokio::spawn(http::server::serve(state));
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let body = r#"{"code":"000000"}"#;
    let raw = format!("POST /pair HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}", body.len(), body);
    let response = send_request(port, &raw).await;
    assert!(response.starts_with("HTTP/1.1 401"));

    let body = format!(r#"{{"code":"{correct_code}"}}"#);
    let raw = format!("POST /pair HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}", body.len(), body);
    let response = send_request(port, &raw).await;
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains("\"token\""));
}
