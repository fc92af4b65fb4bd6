//! Hand-rolled HTTP/1.1 server loop (C19, §4.8). One request per
//! connection: read the head, bound the body by `Content-Length`, dispatch,
//! render, close. No keep-alive, no chunked transfer encoding, no TLS
//! termination here (a reverse proxy is expected to add TLS, per §9).

use std::net::SocketAddr;
use std::sync::Arc;

use ghostclaw_core::config::MAX_BODY_BYTES;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::error::GatewayError;
use crate::http::request::parse_head;
use crate::http::response::HttpResponse;
use crate::http::handlers;
use crate::observability::{self, ComponentStatus};
use crate::state::GatewayState;

/// Bind-address invariant (§9): binding to a non-loopback address requires
/// an explicit opt-in, since this server has no TLS of its own.
pub fn check_bind_allowed(bind: &str, allow_public_bind: bool) -> Result<(), GatewayError> {
    let is_loopback = bind == "127.0.0.1" || bind == "::1" || bind == "localhost";
    if !is_loopback && !allow_public_bind {
        return Err(GatewayError::Forbidden(format!(
            "refusing to bind non-loopback address {bind} without gateway.allow_public_bind=true"
        )));
    }
    Ok(())
}

pub async fn serve(state: Arc<GatewayState>) -> std::io::Result<()> {
    check_bind_allowed(&state.config.gateway.bind, state.config.gateway.allow_public_bind)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::PermissionDenied, e.to_string()))?;

    let addr: SocketAddr = format!("{}:{}", state.config.gateway.bind, state.config.gateway.http_port)
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("{e}")))?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "http server listening");
    observability::set_component_status("gateway", ComponentStatus::Ok);

    loop {
        let (stream, peer) = listener.accept().await?;
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(state, stream).await {
                debug!(%peer, error = %e, "http connection closed with error");
            }
        });
    }
}

async fn handle_connection(state: Arc<GatewayState>, mut stream: TcpStream) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let head_end = loop {
        if buf.len() > MAX_BODY_BYTES {
            write_response(&mut stream, HttpResponse::json(413, serde_json::json!({"error": "request_too_large"}))).await?;
            return Ok(());
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut body = buf[head_end + 4..].to_vec();

    let mut request = match parse_head(&head, Vec::new()) {
        Ok(r) => r,
        Err(e) => {
            write_response(&mut stream, HttpResponse::json(400, serde_json::json!({"error": e.to_string()}))).await?;
            return Ok(());
        }
    };

    let content_length = request.content_length();
    if content_length > MAX_BODY_BYTES {
        write_response(&mut stream, HttpResponse::json(413, serde_json::json!({"error": "request_too_large"}))).await?;
        return Ok(());
    }
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);
    request.body = body;

    let response = handlers::dispatch(&state, &request).await;
    if response.status >= 500 {
        error!(path = %request.path, status = response.status, "http request failed");
    } else {
        debug!(method = %request.method, path = %request.path, status = response.status, "http request handled");
    }
    write_response(&mut stream, response).await?;
    Ok(())
}

async fn write_response(stream: &mut TcpStream, response: HttpResponse) -> std::io::Result<()> {
    let bytes = response.render();
    if let Err(e) = stream.write_all(&bytes).await {
        warn!(error = %e, "failed writing http response");
        return Err(e);
    }
    let _ = stream.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_bind_is_always_allowed() {
        assert!(check_bind_allowed("127.0.0.1", false).is_ok());
    }

    #[test]
    fn public_bind_requires_opt_in() {
        assert!(check_bind_allowed("0.0.0.0", false).is_err());
        assert!(check_bind_allowed("0.0.0.0", true).is_ok());
    }
}
