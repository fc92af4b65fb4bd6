//! WebSocket listener (C20, §4.9): binds `gateway.ws_port`, rejects new
//! connections once [`WsHub::at_capacity`] trips, otherwise hands the
//! socket to [`crate::ws::connection::handle`].

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::http::server::check_bind_allowed;
use crate::observability::{self, ComponentStatus};
use crate::state::GatewayState;
use crate::ws::connection;

const CAPACITY_RESPONSE: &[u8] = b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

pub async fn serve(state: Arc<GatewayState>) -> std::io::Result<()> {
    check_bind_allowed(&state.config.gateway.bind, state.config.gateway.allow_public_bind)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::PermissionDenied, e.to_string()))?;

    let addr: SocketAddr = format!("{}:{}", state.config.gateway.bind, state.config.gateway.ws_port)
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("{e}")))?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "websocket server listening");
    observability::set_component_status("websocket", ComponentStatus::Ok);

    loop {
        let (mut stream, peer) = listener.accept().await?;
        if state.ws_hub.at_capacity() {
            let _ = stream.write_all(CAPACITY_RESPONSE).await;
            debug!(%peer, "websocket connection refused: at capacity");
            continue;
        }
        let state = state.clone();
        tokio::spawn(async move {
            connection::handle(state, stream).await;
        });
    }
}
