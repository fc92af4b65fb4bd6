use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Per-connection identifier (random UUID, never persisted).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnId(pub String);

impl ConnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical session key — `agent:<agent_id>:channel:<channel_id>:peer:<peer_id>` (§3).
///
/// All three segments are required, lowercased and trimmed. Inputs that
/// don't conform to the canonical grammar are not rejected: the raw value
/// is wrapped as the `peer_id` segment against the caller-supplied
/// `agent_id`/`channel_id`, so `normalize` is total over `&str`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub agent_id: String,
    pub channel_id: String,
    pub peer_id: String,
}

const AGENT_MARKER: &str = "agent:";
const CHANNEL_MARKER: &str = ":channel:";
const PEER_MARKER: &str = ":peer:";

impl SessionKey {
    pub fn new(agent_id: impl Into<String>, channel_id: impl Into<String>, peer_id: impl Into<String>) -> Self {
        Self {
            agent_id: normalize_segment(&agent_id.into()),
            channel_id: normalize_segment(&channel_id.into()),
            peer_id: normalize_segment(&peer_id.into()),
        }
    }

    /// Parse a canonical session key string. Returns `None` when the input
    /// doesn't match the `agent:..:channel:..:peer:..` grammar — callers
    /// needing a total function should use [`SessionKey::normalize`].
    pub fn parse(raw: &str) -> Option<Self> {
        let rest = raw.strip_prefix(AGENT_MARKER)?;
        let channel_pos = rest.find(CHANNEL_MARKER)?;
        let agent_id = &rest[..channel_pos];
        let rest = &rest[channel_pos + CHANNEL_MARKER.len()..];
        let peer_pos = rest.find(PEER_MARKER)?;
        let channel_id = &rest[..peer_pos];
        // the peer segment may itself contain colons; take everything after the marker
        let peer_id = &rest[peer_pos + PEER_MARKER.len()..];
        if agent_id.is_empty() || channel_id.is_empty() || peer_id.is_empty() {
            return None;
        }
        Some(Self::new(agent_id, channel_id, peer_id))
    }

    /// Total normalization: parse if possible, otherwise wrap `raw` as the
    /// peer segment under the supplied `agent_id`/`channel_id` (§3).
    pub fn normalize(raw: &str, agent_id: &str, channel_id: &str) -> Self {
        Self::parse(raw).unwrap_or_else(|| Self::new(agent_id, channel_id, raw))
    }

    pub fn format(&self) -> String {
        format!(
            "agent:{}:channel:{}:peer:{}",
            self.agent_id, self.channel_id, self.peer_id
        )
    }

    pub fn as_string(&self) -> String {
        self.format()
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}

fn normalize_segment(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Thinking-level vocabulary used by session overrides and the agent engine
/// options (§3, §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingLevel {
    Minimal,
    Low,
    Standard,
    High,
    Creative,
}

impl ThinkingLevel {
    /// `medium` normalizes to `standard`; unknown values collapse to
    /// `standard` as well.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "minimal" => ThinkingLevel::Minimal,
            "low" => ThinkingLevel::Low,
            "medium" | "standard" => ThinkingLevel::Standard,
            "high" => ThinkingLevel::High,
            "creative" => ThinkingLevel::Creative,
            _ => ThinkingLevel::Standard,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThinkingLevel::Minimal => "minimal",
            ThinkingLevel::Low => "low",
            ThinkingLevel::Standard => "standard",
            ThinkingLevel::High => "high",
            ThinkingLevel::Creative => "creative",
        }
    }

    /// Thinking-level → temperature mapping used by callers before invoking
    /// the provider (§4.6 Options).
    pub fn temperature(&self, default_temperature: f32) -> f32 {
        match self {
            ThinkingLevel::Minimal | ThinkingLevel::Low => default_temperature.min(0.2),
            ThinkingLevel::High => default_temperature.max(0.9),
            ThinkingLevel::Creative => default_temperature.max(0.95),
            ThinkingLevel::Standard => default_temperature,
        }
    }
}

impl Default for ThinkingLevel {
    fn default() -> Self {
        ThinkingLevel::Standard
    }
}

impl fmt::Display for ThinkingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_canonical_key() {
        let key = SessionKey::new("ghostclaw", "webhook", "default");
        let formatted = key.format();
        assert_eq!(formatted, "agent:ghostclaw:channel:webhook:peer:default");
        assert_eq!(SessionKey::parse(&formatted), Some(key));
    }

    #[test]
    fn normalize_is_total_over_garbage_input() {
        let key = SessionKey::normalize("not-a-session-key", "ghostclaw", "webhook");
        assert_eq!(key.peer_id, "not-a-session-key");
        assert_eq!(key.agent_id, "ghostclaw");
        assert_eq!(key.channel_id, "webhook");
    }

    #[test]
    fn peer_segment_may_contain_colons() {
        let key = SessionKey::new("ghostclaw", "webhook", "user:42:thread:7");
        let formatted = key.format();
        let parsed = SessionKey::parse(&formatted).unwrap();
        assert_eq!(parsed.peer_id, "user:42:thread:7");
    }

    #[test]
    fn segments_are_lowercased_and_trimmed() {
        let key = SessionKey::new("  GhostClaw ", "WEBHOOK", " Default ");
        assert_eq!(key.agent_id, "ghostclaw");
        assert_eq!(key.channel_id, "webhook");
        assert_eq!(key.peer_id, "default");
    }

    #[test]
    fn thinking_level_normalizes_medium_and_unknown() {
        assert_eq!(ThinkingLevel::parse("medium"), ThinkingLevel::Standard);
        assert_eq!(ThinkingLevel::parse("bogus"), ThinkingLevel::Standard);
    }

    #[test]
    fn thinking_level_temperature_mapping() {
        assert_eq!(ThinkingLevel::Low.temperature(0.7), 0.2);
        assert_eq!(ThinkingLevel::High.temperature(0.7), 0.9);
        assert_eq!(ThinkingLevel::Creative.temperature(0.7), 0.95);
        assert_eq!(ThinkingLevel::Standard.temperature(0.7), 0.7);
    }
}
