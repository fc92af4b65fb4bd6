//! Per-session lane (§4.8, §5): a weak-map keyed by normalized session id,
//! handing out a shared `Arc<Mutex<()>>` so each `/webhook` request or WS
//! `agent.run` call serializes within a session while running in parallel
//! across sessions.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub struct SessionLanes {
    lanes: DashMap<String, Weak<Mutex<()>>>,
}

impl SessionLanes {
    pub fn new() -> Self {
        Self { lanes: DashMap::new() }
    }

    fn lane_for(&self, session_id: &str) -> Arc<Mutex<()>> {
        if let Some(existing) = self.lanes.get(session_id).and_then(|w| w.upgrade()) {
            return existing;
        }
        let fresh = Arc::new(Mutex::new(()));
        self.lanes.insert(session_id.to_string(), Arc::downgrade(&fresh));
        fresh
    }

    /// Acquire the lane for `session_id`. Returns the held guard plus
    /// whether the lane was already held by another caller (the caller
    /// uses this to decide whether to publish a "queued" event first).
    pub async fn acquire(&self, session_id: &str) -> (OwnedMutexGuard<()>, bool) {
        let lane = self.lane_for(session_id);
        match Arc::clone(&lane).try_lock_owned() {
            Ok(guard) => (guard, false),
            Err(_) => (lane.lock_owned().await, true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serializes_same_session_parallel_across_others() {
        let lanes = Arc::new(SessionLanes::new());
        let l1 = lanes.clone();
        let guard1 = l1.acquire("a").await.0;

        let l2 = lanes.clone();
        let other_session = tokio::spawn(async move { l2.acquire("b").await });
        let (_guard_b, contended_b) = other_session.await.unwrap();
        assert!(!contended_b);

        drop(guard1);
    }

    #[tokio::test]
    async fn lane_is_reclaimed_once_dropped() {
        let lanes = SessionLanes::new();
        {
            let (_guard, contended) = lanes.acquire("x").await;
            assert!(!contended);
        }
        let (_guard2, contended2) = lanes.acquire("x").await;
        assert!(!contended2);
    }
}
