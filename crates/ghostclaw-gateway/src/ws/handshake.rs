//! RFC 6455 opening handshake (C20): manual header validation plus the
//! `Sec-WebSocket-Accept` computation (SHA-1 of the client key + the RFC
//! 6455 GUID, base64-encoded).

use base64::Engine;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{GatewayError, Result};
use crate::http::request::{parse_head, HttpRequest};

const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
pub const MAX_HANDSHAKE_BYTES: usize = 8 * 1024;

pub fn websocket_accept(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    let digest = hasher.finalize();
    base64::engine::general_purpose::STANDARD.encode(digest)
}

/// Read the handshake request off `stream` (bounded by
/// [`MAX_HANDSHAKE_BYTES`]) and validate it's a conforming upgrade request.
pub async fn read_handshake_request<R: AsyncRead + Unpin>(stream: &mut R) -> Result<HttpRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 512];
    loop {
        if buf.len() >= MAX_HANDSHAKE_BYTES {
            return Err(GatewayError::BadRequest("handshake too large".to_string()));
        }
        let n = stream.read(&mut chunk).await.map_err(|e| GatewayError::BadRequest(e.to_string()))?;
        if n == 0 {
            return Err(GatewayError::BadRequest("connection closed during handshake".to_string()));
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_header_end(&buf) {
            let head = String::from_utf8_lossy(&buf[..pos]).into_owned();
            return parse_head(&head, Vec::new());
        }
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Validate the parsed request is a conforming WS upgrade. Returns the
/// client's `Sec-WebSocket-Key` on success.
pub fn validate_upgrade_request(request: &HttpRequest) -> Result<String> {
    if request.method != "GET" {
        return Err(GatewayError::BadRequest("websocket upgrade requires GET".to_string()));
    }

    let upgrade = request.header("upgrade").unwrap_or_default().to_lowercase();
    let connection = request.header("connection").unwrap_or_default().to_lowercase();
    let version = request.header("sec-websocket-version").unwrap_or_default().trim().to_string();
    let key = request.header("sec-websocket-key").map(|s| s.to_string());

    if upgrade != "websocket" || !connection.contains("upgrade") || version != "13" || key.is_none() {
        return Err(GatewayError::BadRequest("missing or invalid websocket headers".to_string()));
    }

    Ok(key.unwrap())
}

pub async fn write_handshake_response<W: AsyncWrite + Unpin>(stream: &mut W, accept_key: &str) -> Result<()> {
    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {accept_key}\r\n\r\n"
    );
    stream.write_all(response.as_bytes()).await.map_err(|e| GatewayError::Internal(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_known_accept_key() {
        // RFC 6455 §1.3 worked example.
        let accept = websocket_accept("dGhlIHNhbXBsZSBub25jZQ==");
        assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn validates_conforming_upgrade_request() {
        let req = parse_head(
            "GET /ws HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Version: 13\r\nSec-WebSocket-Key: abc==",
            Vec::new(),
        )
        .unwrap();
        assert_eq!(validate_upgrade_request(&req).unwrap(), "abc==");
    }

    #[test]
    fn rejects_missing_version() {
        let req = parse_head("GET /ws HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: abc==", Vec::new()).unwrap();
        assert!(validate_upgrade_request(&req).is_err());
    }

    #[test]
    fn rejects_non_get_method() {
        let req = parse_head(
            "POST /ws HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Version: 13\r\nSec-WebSocket-Key: abc==",
            Vec::new(),
        )
        .unwrap();
        assert!(validate_upgrade_request(&req).is_err());
    }
}
