use ghostclaw_protocol::frames::{ClientEnvelope, ClientMessage, ServerFrame};

#[test]
fn rpc_envelope_without_type_still_classifies() {
    let json = r#"{"id":"req-1","method":"health"}"#;
    let env: ClientEnvelope = serde_json::from_str(json).unwrap();
    match env.classify() {
        ClientMessage::Rpc { id, method, .. } => {
            assert_eq!(id, "req-1");
            assert_eq!(method, "health");
        }
        other => panic!("expected Rpc, got {other:?}"),
    }
}

#[test]
fn server_frame_rpc_result_serialization() {
    let frame = ServerFrame::rpc_result("req-1", serde_json::json!({"status": "ok"}));
    let json = frame.to_json();
    assert!(json.contains(r#""type":"rpc.result""#));
    assert!(json.contains(r#""status":"ok""#));
    assert!(!json.contains("\"error\""));
}

#[test]
fn server_frame_error_serialization() {
    let frame = ServerFrame::error("req-2", "session_rate_limited", "too many requests");
    let json = frame.to_json();
    assert!(json.contains(r#""type":"error""#));
    assert!(json.contains("session_rate_limited"));
    assert!(!json.contains("\"payload\""));
}

#[test]
fn server_frame_event_carries_session() {
    let frame = ServerFrame::event("agent:a:channel:b:peer:c", serde_json::json!({"token": "hel"}));
    let json = frame.to_json();
    assert!(json.contains(r#""type":"event""#));
    assert!(json.contains("agent:a:channel:b:peer:c"));
}
