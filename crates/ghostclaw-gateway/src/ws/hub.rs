//! Connected-client registry (C20): subscription sets, the connection cap,
//! and `event` fan-out to every client subscribed to a session.

use std::collections::HashSet;
use std::sync::Mutex;

use dashmap::DashMap;
use ghostclaw_protocol::ServerFrame;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

pub struct ClientHandle {
    sender: UnboundedSender<String>,
    sessions: Mutex<HashSet<String>>,
}

impl ClientHandle {
    fn send(&self, frame: &ServerFrame) {
        let _ = self.sender.send(frame.to_json());
    }
}

/// Registry of connected WS clients, keyed by a per-connection id.
/// Ambient connection cap (not explicitly named in the wire spec, carried
/// over from the original implementation): once `max_clients` is reached,
/// new connections are refused before the handshake completes.
pub struct WsHub {
    clients: DashMap<String, ClientHandle>,
    max_clients: usize,
}

impl WsHub {
    pub fn new(max_clients: usize) -> Self {
        Self { clients: DashMap::new(), max_clients }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn at_capacity(&self) -> bool {
        self.clients.len() >= self.max_clients
    }

    pub fn register(&self, conn_id: String, sender: UnboundedSender<String>) {
        self.clients.insert(conn_id, ClientHandle { sender, sessions: Mutex::new(HashSet::new()) });
    }

    pub fn remove(&self, conn_id: &str) {
        self.clients.remove(conn_id);
    }

    pub fn subscribe(&self, conn_id: &str, session: String) {
        if let Some(client) = self.clients.get(conn_id) {
            client.sessions.lock().expect("sessions lock poisoned").insert(session);
        }
    }

    pub fn unsubscribe(&self, conn_id: &str, session: &str) {
        if let Some(client) = self.clients.get(conn_id) {
            client.sessions.lock().expect("sessions lock poisoned").remove(session);
        }
    }

    /// Send a frame to one specific client (used for `rpc.event`/`rpc.result`
    /// replies to the caller of an in-flight RPC).
    pub fn send_to(&self, conn_id: &str, frame: &ServerFrame) {
        if let Some(client) = self.clients.get(conn_id) {
            client.send(frame);
        }
    }

    /// Broadcast an `event` frame to every client subscribed to `session`.
    /// Clients whose send fails (channel closed) are dropped from the
    /// registry.
    pub fn publish_session_event(&self, session: &str, payload: impl Serialize) {
        let frame = ServerFrame::event(session, payload);
        let mut dead = Vec::new();
        for entry in self.clients.iter() {
            let subscribed = entry.value().sessions.lock().expect("sessions lock poisoned").contains(session);
            if subscribed && entry.value().sender.send(frame.to_json()).is_err() {
                dead.push(entry.key().clone());
            }
        }
        for conn_id in dead {
            self.clients.remove(&conn_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn publishes_only_to_subscribed_clients() {
        let hub = WsHub::new(10);
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        hub.register("a".to_string(), tx_a);
        hub.register("b".to_string(), tx_b);
        hub.subscribe("a", "agent:x:channel:y:peer:z".to_string());

        hub.publish_session_event("agent:x:channel:y:peer:z", serde_json::json!({"hello": true}));

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn capacity_check() {
        let hub = WsHub::new(1);
        assert!(!hub.at_capacity());
        let (tx, _rx) = mpsc::unbounded_channel();
        hub.register("a".to_string(), tx);
        assert!(hub.at_capacity());
    }

    #[test]
    fn unsubscribe_stops_future_events() {
        let hub = WsHub::new(10);
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.register("a".to_string(), tx);
        hub.subscribe("a", "s1".to_string());
        hub.unsubscribe("a", "s1");
        hub.publish_session_event("s1", serde_json::json!({}));
        assert!(rx.try_recv().is_err());
    }
}
