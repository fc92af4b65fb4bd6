//! Per-connection WebSocket lifecycle (C20, §4.9): handshake, `hello`,
//! subscribe/unsubscribe, RPC dispatch, and the writer task draining the
//! client's outbound queue.

use std::sync::Arc;

use ghostclaw_core::config::MAX_WS_FRAME_BYTES;
use ghostclaw_protocol::{ClientEnvelope, ClientMessage, ServerFrame};
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::agent_run::RpcEmitTarget;
use crate::error::GatewayError;
use crate::rpc;
use crate::state::GatewayState;
use crate::ws::frame::{self, OPCODE_CLOSE, OPCODE_PING, OPCODE_PONG, OPCODE_TEXT};
use crate::ws::handshake::{read_handshake_request, validate_upgrade_request, websocket_accept, write_handshake_response};

pub async fn handle(state: Arc<GatewayState>, mut stream: TcpStream) {
    let request = match read_handshake_request(&mut stream).await {
        Ok(r) => r,
        Err(e) => {
            debug!(error = %e, "websocket handshake read failed");
            return;
        }
    };
    let key = match validate_upgrade_request(&request) {
        Ok(k) => k,
        Err(e) => {
            debug!(error = %e, "websocket handshake validation failed");
            return;
        }
    };

    if state.config.gateway.require_authorization {
        let authorized = request
            .header("authorization")
            .and_then(ghostclaw_protocol::pairing::strip_bearer_prefix)
            .map(|token| match &state.pairing {
                Some(pairing) => pairing.lock().expect("pairing lock poisoned").validate_bearer(token),
                None => state.config.gateway.paired_tokens.iter().any(|t| t == token),
            })
            .unwrap_or(false);
        if !authorized {
            let _ = stream.shutdown().await;
            return;
        }
    }

    let accept = websocket_accept(&key);
    if write_handshake_response(&mut stream, &accept).await.is_err() {
        return;
    }

    let conn_id = Uuid::new_v4().to_string();
    let (reader, writer) = tokio::io::split(stream);
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    state.ws_hub.register(conn_id.clone(), tx.clone());

    let writer_task = tokio::spawn(run_writer(writer, rx));
    let _ = tx.send(ServerFrame::hello().to_json());

    run_reader(&state, &conn_id, reader, &tx).await;

    state.ws_hub.remove(&conn_id);
    drop(tx);
    let _ = writer_task.await;
}

async fn run_writer(mut writer: WriteHalf<TcpStream>, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(message) = rx.recv().await {
        if frame::write_frame(&mut writer, OPCODE_TEXT, message.as_bytes()).await.is_err() {
            break;
        }
    }
}

async fn run_reader(state: &Arc<GatewayState>, conn_id: &str, mut reader: ReadHalf<TcpStream>, tx: &mpsc::UnboundedSender<String>) {
    loop {
        let frame = match frame::read_frame(&mut reader, MAX_WS_FRAME_BYTES).await {
            Ok(f) => f,
            Err(e) => {
                debug!(%conn_id, error = %e, "websocket read failed, closing connection");
                return;
            }
        };

        match frame.opcode {
            OPCODE_CLOSE => return,
            OPCODE_PING => {
                let _ = tx.send(ServerFrame::pong().to_json());
            }
            OPCODE_PONG => {}
            _ => handle_text(state, conn_id, &frame.payload, tx).await,
        }
    }
}

async fn handle_text(state: &Arc<GatewayState>, conn_id: &str, payload: &[u8], tx: &mpsc::UnboundedSender<String>) {
    let envelope: ClientEnvelope = match serde_json::from_slice(payload) {
        Ok(e) => e,
        Err(_) => {
            let _ = tx.send(ServerFrame::error("", "invalid_request", "malformed json frame").to_json());
            return;
        }
    };

    match envelope.classify() {
        ClientMessage::Subscribe { session } => {
            state.ws_hub.subscribe(conn_id, session);
        }
        ClientMessage::Unsubscribe { session } => {
            state.ws_hub.unsubscribe(conn_id, &session);
        }
        ClientMessage::Ping => {
            let _ = tx.send(ServerFrame::pong().to_json());
        }
        ClientMessage::Rpc { id, method, params, .. } => {
            let emit_target = RpcEmitTarget { hub: &state.ws_hub, conn_id, rpc_id: &id };
            match rpc::dispatch(state, &method, &params, Some(emit_target)).await {
                Ok(payload) => {
                    let _ = tx.send(ServerFrame::rpc_result(id, payload).to_json());
                }
                Err(e) => {
                    let frame = ServerFrame::error(id, error_code(&e), &e.to_string());
                    let _ = tx.send(frame.to_json());
                }
            }
        }
        ClientMessage::Unknown => {
            let _ = tx.send(ServerFrame::error("", "invalid_request", "unrecognized frame").to_json());
        }
    }
}

fn error_code(error: &GatewayError) -> &'static str {
    error.code()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_gateway_error_to_code() {
        assert_eq!(error_code(&GatewayError::RateLimited), "session_rate_limited");
    }
}
