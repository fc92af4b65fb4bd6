//! Hand-rolled HTTP/1.1 request line + header parsing (C19). Bodies are
//! read separately by the connection loop once `Content-Length` is known.

use std::collections::HashMap;

use crate::error::{GatewayError, Result};

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    /// Header names are lowercased; values are trimmed.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(|s| s.as_str())
    }

    pub fn content_length(&self) -> usize {
        self.header("content-length").and_then(|v| v.trim().parse().ok()).unwrap_or(0)
    }

    pub fn body_str(&self) -> &str {
        std::str::from_utf8(&self.body).unwrap_or("")
    }

    pub fn json_body(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

/// Parse everything up to and including the request line and headers
/// (`raw` must NOT include the trailing `\r\n\r\n` separator or any body
/// bytes). `body` is attached separately once read.
pub fn parse_head(raw: &str, body: Vec<u8>) -> Result<HttpRequest> {
    let mut lines = raw.split("\r\n");
    let request_line = lines.next().ok_or_else(|| GatewayError::BadRequest("empty request".to_string()))?;

    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| GatewayError::BadRequest("missing method".to_string()))?.to_string();
    let raw_path = parts.next().ok_or_else(|| GatewayError::BadRequest("missing path".to_string()))?;

    let (path, query) = match raw_path.split_once('?') {
        Some((path, query_str)) => (path.to_string(), parse_query_string(query_str)),
        None => (raw_path.to_string(), HashMap::new()),
    };

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_lowercase(), value.trim().to_string());
        }
    }

    Ok(HttpRequest { method, path, query, headers, body })
}

pub fn parse_query_string(query: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        match pair.split_once('=') {
            Some((k, v)) => {
                out.insert(urlencoding_decode(k), urlencoding_decode(v));
            }
            None => {
                out.insert(urlencoding_decode(pair), String::new());
            }
        }
    }
    out
}

/// Minimal `application/x-www-form-urlencoded`-style decode: `+` → space,
/// `%XX` → byte. Invalid escapes pass through unchanged.
fn urlencoding_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok().and_then(|s| u8::from_str_radix(s, 16).ok());
                match hex {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_method_path_and_query() {
        let req = parse_head("GET /webhook?foo=bar HTTP/1.1\r\nContent-Type: application/json", Vec::new()).unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/webhook");
        assert_eq!(req.query.get("foo"), Some(&"bar".to_string()));
        assert_eq!(req.header("content-type"), Some("application/json"));
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let req = parse_head("POST /pair HTTP/1.1\r\nX-Pairing-Code: ABC123", Vec::new()).unwrap();
        assert_eq!(req.header("x-pairing-code"), Some("ABC123"));
    }

    #[test]
    fn content_length_defaults_to_zero() {
        let req = parse_head("GET / HTTP/1.1", Vec::new()).unwrap();
        assert_eq!(req.content_length(), 0);
    }
}
