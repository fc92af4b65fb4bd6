//! Hand-rolled RFC 6455 frame read/write (C20). Text frames only: no
//! continuation or binary support, matching the wire contract this port
//! carries over unchanged.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{GatewayError, Result};

pub const OPCODE_CONTINUATION: u8 = 0x0;
pub const OPCODE_TEXT: u8 = 0x1;
pub const OPCODE_BINARY: u8 = 0x2;
pub const OPCODE_CLOSE: u8 = 0x8;
pub const OPCODE_PING: u8 = 0x9;
pub const OPCODE_PONG: u8 = 0xA;

pub struct Frame {
    pub opcode: u8,
    pub payload: Vec<u8>,
}

/// Read one client frame. Rejects non-FIN frames (no fragmentation
/// support), unmasked frames (RFC 6455 requires client→server masking),
/// and payloads over `max_payload_bytes`.
pub async fn read_frame<R: AsyncRead + Unpin>(stream: &mut R, max_payload_bytes: usize) -> Result<Frame> {
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).await.map_err(|e| GatewayError::BadRequest(format!("frame read failed: {e}")))?;

    let fin = header[0] & 0x80 != 0;
    let opcode = header[0] & 0x0F;
    let masked = header[1] & 0x80 != 0;
    let len_byte = header[1] & 0x7F;

    if !fin {
        return Err(GatewayError::BadRequest("fragmented frames are not supported".to_string()));
    }
    if !masked {
        return Err(GatewayError::BadRequest("unmasked client frame".to_string()));
    }

    let payload_len: u64 = match len_byte {
        126 => {
            let mut ext = [0u8; 2];
            stream.read_exact(&mut ext).await.map_err(|e| GatewayError::BadRequest(e.to_string()))?;
            u16::from_be_bytes(ext) as u64
        }
        127 => {
            let mut ext = [0u8; 8];
            stream.read_exact(&mut ext).await.map_err(|e| GatewayError::BadRequest(e.to_string()))?;
            u64::from_be_bytes(ext)
        }
        n => n as u64,
    };

    if payload_len as usize > max_payload_bytes {
        return Err(GatewayError::PayloadTooLarge { size: payload_len as usize, max: max_payload_bytes });
    }

    let mut mask_key = [0u8; 4];
    stream.read_exact(&mut mask_key).await.map_err(|e| GatewayError::BadRequest(e.to_string()))?;

    let mut payload = vec![0u8; payload_len as usize];
    stream.read_exact(&mut payload).await.map_err(|e| GatewayError::BadRequest(e.to_string()))?;
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask_key[i % 4];
    }

    Ok(Frame { opcode, payload })
}

/// Render a server frame (always FIN=1, always unmasked per RFC 6455).
pub fn render_frame(opcode: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 10);
    out.push(0x80 | opcode);

    let len = payload.len();
    if len < 126 {
        out.push(len as u8);
    } else if len <= u16::MAX as usize {
        out.push(126);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(127);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }
    out.extend_from_slice(payload);
    out
}

pub async fn write_frame<W: AsyncWrite + Unpin>(stream: &mut W, opcode: u8, payload: &[u8]) -> Result<()> {
    let bytes = render_frame(opcode, payload);
    stream.write_all(&bytes).await.map_err(|e| GatewayError::Internal(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn mask_client_frame(opcode: u8, payload: &[u8], mask: [u8; 4]) -> Vec<u8> {
        let mut out = vec![0x80 | opcode];
        let len = payload.len();
        if len < 126 {
            out.push(0x80 | len as u8);
        } else {
            out.push(0x80 | 126);
            out.extend_from_slice(&(len as u16).to_be_bytes());
        }
        out.extend_from_slice(&mask);
        for (i, b) in payload.iter().enumerate() {
            out.push(b ^ mask[i % 4]);
        }
        out
    }

    #[tokio::test]
    async fn reads_small_masked_text_frame() {
        let raw = mask_client_frame(OPCODE_TEXT, b"hello", [1, 2, 3, 4]);
        let mut cursor = Cursor::new(raw);
        let frame = read_frame(&mut cursor, 1024).await.unwrap();
        assert_eq!(frame.opcode, OPCODE_TEXT);
        assert_eq!(frame.payload, b"hello");
    }

    #[tokio::test]
    async fn rejects_unmasked_frame() {
        let raw = vec![0x80 | OPCODE_TEXT, 0x05, b'h', b'e', b'l', b'l', b'o'];
        let mut cursor = Cursor::new(raw);
        assert!(read_frame(&mut cursor, 1024).await.is_err());
    }

    #[tokio::test]
    async fn rejects_oversized_payload() {
        let raw = mask_client_frame(OPCODE_TEXT, &vec![0u8; 200], [1, 2, 3, 4]);
        let mut cursor = Cursor::new(raw);
        assert!(read_frame(&mut cursor, 100).await.is_err());
    }

    #[test]
    fn server_frames_are_unmasked_with_fin_set() {
        let rendered = render_frame(OPCODE_TEXT, b"hi");
        assert_eq!(rendered[0], 0x80 | OPCODE_TEXT);
        assert_eq!(rendered[1] & 0x80, 0);
    }
}
