//! Session send policy (C17): token-bucket-style per-session ingress rate
//! limit, applied before a session lane is acquired.

use std::time::Instant;

use dashmap::DashMap;

use crate::types::SessionKey;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// One bucket per session key, refilled continuously at `refill_per_sec`
/// up to `capacity`.
pub struct SessionSendPolicy {
    capacity: f64,
    refill_per_sec: f64,
    buckets: DashMap<SessionKey, Bucket>,
}

impl SessionSendPolicy {
    pub fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            capacity,
            refill_per_sec,
            buckets: DashMap::new(),
        }
    }

    /// Attempt to consume one token for `key`. Returns `false` when the
    /// session has exhausted its budget and should be rejected.
    pub fn try_acquire(&self, key: &SessionKey) -> bool {
        let mut bucket = self
            .buckets
            .entry(key.clone())
            .or_insert_with(|| Bucket {
                tokens: self.capacity,
                last_refill: Instant::now(),
            });

        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SessionKey {
        SessionKey::new("ghostclaw", "webhook", "alice")
    }

    #[test]
    fn admits_up_to_capacity_then_rejects() {
        let policy = SessionSendPolicy::new(2.0, 0.0);
        let k = key();
        assert!(policy.try_acquire(&k));
        assert!(policy.try_acquire(&k));
        assert!(!policy.try_acquire(&k));
    }

    #[test]
    fn buckets_are_independent_per_session() {
        let policy = SessionSendPolicy::new(1.0, 0.0);
        let a = SessionKey::new("ghostclaw", "webhook", "alice");
        let b = SessionKey::new("ghostclaw", "webhook", "bob");
        assert!(policy.try_acquire(&a));
        assert!(!policy.try_acquire(&a));
        assert!(policy.try_acquire(&b));
    }
}
