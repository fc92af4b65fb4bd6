//! Hand-rolled HTTP/1.1 response rendering (C19). Every response closes
//! the connection — this server is one request per connection.

use serde::Serialize;

pub struct HttpResponse {
    pub status: u16,
    pub content_type: String,
    pub extra_headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn json(status: u16, value: impl Serialize) -> Self {
        let body = serde_json::to_vec(&value).unwrap_or_else(|_| b"{}".to_vec());
        Self { status, content_type: "application/json".to_string(), extra_headers: Vec::new(), body }
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self { status, content_type: "text/plain".to_string(), extra_headers: Vec::new(), body: body.into().into_bytes() }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    pub fn render(&self) -> Vec<u8> {
        let mut out = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n",
            self.status,
            status_text(self.status),
            self.content_type,
            self.body.len(),
        );
        for (name, value) in &self.extra_headers {
            out.push_str(&format!("{name}: {value}\r\n"));
        }
        out.push_str("\r\n");
        let mut bytes = out.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "OK",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_status_line_and_headers() {
        let resp = HttpResponse::json(200, serde_json::json!({"status": "ok"}));
        let rendered = String::from_utf8(resp.render()).unwrap();
        assert!(rendered.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(rendered.contains("Connection: close\r\n"));
        assert!(rendered.contains("Content-Type: application/json\r\n"));
        assert!(rendered.ends_with("{\"status\":\"ok\"}"));
    }

    #[test]
    fn extra_headers_are_included() {
        let resp = HttpResponse::json(429, serde_json::json!({"error": "locked_out"})).with_header("Retry-After", "60");
        let rendered = String::from_utf8(resp.render()).unwrap();
        assert!(rendered.contains("Retry-After: 60\r\n"));
    }
}
