//! Pairing state: one-time pairing code → durable bearer token hashes (C18).

use std::collections::HashSet;
use std::time::{Duration, Instant};

use rand::Rng;
use sha2::{Digest, Sha256};

const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789"; // base32-like, no ambiguous chars
const CODE_LEN: usize = 6;

pub fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time string comparison, used for bearer-token hash checks.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

#[derive(Debug)]
pub enum PairError {
    Invalid,
    LockedOut { retry_after_secs: u64 },
}

/// Process-scoped pairing code plus the set of bearer-token hashes it has
/// issued across its lifetime. Lockout state is not persisted (§9).
pub struct PairingState {
    plaintext_code: String,
    max_attempts: u32,
    attempts: u32,
    locked_until: Option<Instant>,
    lockout_duration: Duration,
    bearer_token_hashes: HashSet<String>,
    preconfigured_hashes: HashSet<String>,
}

impl PairingState {
    pub fn new(max_attempts: u32, preconfigured_tokens: &[String]) -> Self {
        let preconfigured_hashes = preconfigured_tokens.iter().map(|t| sha256_hex(t)).collect();
        Self {
            plaintext_code: generate_code(),
            max_attempts,
            attempts: 0,
            locked_until: None,
            lockout_duration: Duration::from_secs(300),
            bearer_token_hashes: HashSet::new(),
            preconfigured_hashes,
        }
    }

    pub fn code(&self) -> &str {
        &self.plaintext_code
    }

    /// Verify a pairing code; on success, mint a fresh bearer token, record
    /// its hash, and return the plaintext token once.
    pub fn verify(&mut self, candidate: &str) -> Result<String, PairError> {
        if let Some(until) = self.locked_until {
            let now = Instant::now();
            if now < until {
                return Err(PairError::LockedOut {
                    retry_after_secs: (until - now).as_secs().max(1),
                });
            }
            self.locked_until = None;
            self.attempts = 0;
        }

        if constant_time_eq(candidate.trim(), &self.plaintext_code) {
            self.attempts = 0;
            let token = generate_bearer_token();
            self.bearer_token_hashes.insert(sha256_hex(&token));
            return Ok(token);
        }

        self.attempts += 1;
        if self.attempts >= self.max_attempts {
            self.locked_until = Some(Instant::now() + self.lockout_duration);
            return Err(PairError::LockedOut {
                retry_after_secs: self.lockout_duration.as_secs(),
            });
        }
        Err(PairError::Invalid)
    }

    /// Constant-time-compare a bearer token's hash against both
    /// runtime-issued and pre-configured hash sets.
    pub fn validate_bearer(&self, token: &str) -> bool {
        let candidate = sha256_hex(token);
        self.bearer_token_hashes
            .iter()
            .chain(self.preconfigured_hashes.iter())
            .any(|known| constant_time_eq(known, &candidate))
    }
}

fn generate_bearer_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    hex::encode(bytes)
}

/// Strip a leading `Bearer ` prefix from an `Authorization` header value.
pub fn strip_bearer_prefix(header_value: &str) -> Option<&str> {
    header_value.strip_prefix("Bearer ").or_else(|| header_value.strip_prefix("bearer "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_succeeds_with_correct_code() {
        let mut state = PairingState::new(3, &[]);
        let code = state.code().to_string();
        let token = state.verify(&code).unwrap();
        assert!(state.validate_bearer(&token));
    }

    #[test]
    fn verify_fails_with_wrong_code() {
        let mut state = PairingState::new(3, &[]);
        assert!(matches!(state.verify("WRONGX"), Err(PairError::Invalid)));
    }

    #[test]
    fn lockout_after_max_attempts() {
        let mut state = PairingState::new(2, &[]);
        let _ = state.verify("WRONG1");
        match state.verify("WRONG2") {
            Err(PairError::LockedOut { retry_after_secs }) => assert!(retry_after_secs > 0),
            other => panic!("expected LockedOut, got {other:?}"),
        }
    }

    #[test]
    fn preconfigured_tokens_validate() {
        let state = PairingState::new(3, &["preset-token".to_string()]);
        assert!(state.validate_bearer("preset-token"));
        assert!(!state.validate_bearer("other-token"));
    }

    #[test]
    fn strips_bearer_prefix() {
        assert_eq!(strip_bearer_prefix("Bearer abc123"), Some("abc123"));
        assert_eq!(strip_bearer_prefix("abc123"), None);
    }
}
