use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw client → server envelope (§4.9). `type` may be omitted when `method`
/// is present — a bare RPC call is assumed in that case. RPC params are
/// inlined into the top-level object rather than nested under a `params`
/// key, so anything beyond `type`/`id`/`method`/`session` is captured by
/// `fields`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientEnvelope {
    #[serde(rename = "type", default)]
    pub frame_type: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub session: Option<String>,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, Value>,
}

/// Classified client message, resolved from a [`ClientEnvelope`].
#[derive(Debug, Clone)]
pub enum ClientMessage {
    Subscribe { session: String },
    Unsubscribe { session: String },
    Ping,
    Rpc {
        id: String,
        method: String,
        session: Option<String>,
        params: serde_json::Map<String, Value>,
    },
    Unknown,
}

impl ClientEnvelope {
    pub fn classify(self) -> ClientMessage {
        let kind = self.frame_type.as_deref();
        if let Some(method) = self.method.clone() {
            return ClientMessage::Rpc {
                id: self.id.unwrap_or_default(),
                method,
                session: self.session,
                params: self.fields,
            };
        }
        match kind {
            Some("subscribe") => match self.session {
                Some(session) => ClientMessage::Subscribe { session },
                None => ClientMessage::Unknown,
            },
            Some("unsubscribe") => match self.session {
                Some(session) => ClientMessage::Unsubscribe { session },
                None => ClientMessage::Unknown,
            },
            Some("ping") => ClientMessage::Ping,
            Some("rpc") => match (self.id, self.method) {
                (Some(id), Some(method)) => ClientMessage::Rpc {
                    id,
                    method,
                    session: self.session,
                    params: self.fields,
                },
                _ => ClientMessage::Unknown,
            },
            _ => ClientMessage::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorShape {
    pub code: String,
    pub message: String,
}

/// Server → client frame. `type` is one of `event`, `rpc.event`,
/// `rpc.result`, `ack`, `error`, `hello`, `pong` (§4.9).
#[derive(Debug, Clone, Serialize)]
pub struct ServerFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
}

impl ServerFrame {
    pub fn hello() -> Self {
        Self::bare("hello")
    }

    pub fn pong() -> Self {
        Self::bare("pong")
    }

    pub fn ack(id: impl Into<String>) -> Self {
        Self {
            frame_type: "ack".to_string(),
            id: Some(id.into()),
            session: None,
            payload: None,
            error: None,
        }
    }

    pub fn event(session: impl Into<String>, payload: impl Serialize) -> Self {
        Self {
            frame_type: "event".to_string(),
            id: None,
            session: Some(session.into()),
            payload: Some(serde_json::to_value(payload).unwrap_or(Value::Null)),
            error: None,
        }
    }

    pub fn rpc_result(id: impl Into<String>, payload: impl Serialize) -> Self {
        Self {
            frame_type: "rpc.result".to_string(),
            id: Some(id.into()),
            session: None,
            payload: Some(serde_json::to_value(payload).unwrap_or(Value::Null)),
            error: None,
        }
    }

    pub fn rpc_event(id: impl Into<String>, session: impl Into<String>, payload: impl Serialize) -> Self {
        Self {
            frame_type: "rpc.event".to_string(),
            id: Some(id.into()),
            session: Some(session.into()),
            payload: Some(serde_json::to_value(payload).unwrap_or(Value::Null)),
            error: None,
        }
    }

    pub fn error(id: impl Into<String>, code: &str, message: &str) -> Self {
        Self {
            frame_type: "error".to_string(),
            id: Some(id.into()),
            session: None,
            payload: None,
            error: Some(ErrorShape {
                code: code.to_string(),
                message: message.to_string(),
            }),
        }
    }

    fn bare(frame_type: &str) -> Self {
        Self {
            frame_type: frame_type.to_string(),
            id: None,
            session: None,
            payload: None,
            error: None,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{\"type\":\"error\"}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_bare_rpc_without_type() {
        let raw = r#"{"id":"1","method":"agent.run","message":"hi"}"#;
        let env: ClientEnvelope = serde_json::from_str(raw).unwrap();
        match env.classify() {
            ClientMessage::Rpc { id, method, params, .. } => {
                assert_eq!(id, "1");
                assert_eq!(method, "agent.run");
                assert_eq!(params.get("message").unwrap(), "hi");
            }
            other => panic!("expected Rpc, got {other:?}"),
        }
    }

    #[test]
    fn classifies_subscribe() {
        let raw = r#"{"type":"subscribe","session":"agent:a:channel:b:peer:c"}"#;
        let env: ClientEnvelope = serde_json::from_str(raw).unwrap();
        match env.classify() {
            ClientMessage::Subscribe { session } => assert_eq!(session, "agent:a:channel:b:peer:c"),
            other => panic!("expected Subscribe, got {other:?}"),
        }
    }

    #[test]
    fn classifies_ping() {
        let raw = r#"{"type":"ping"}"#;
        let env: ClientEnvelope = serde_json::from_str(raw).unwrap();
        assert!(matches!(env.classify(), ClientMessage::Ping));
    }
}
