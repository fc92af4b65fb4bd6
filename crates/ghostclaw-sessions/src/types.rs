use std::collections::HashMap;

use ghostclaw_core::types::ThinkingLevel;
use serde::{Deserialize, Serialize};

pub use ghostclaw_core::types::SessionKey;

/// Per-session overrides tracked by the session store (§3 Session state).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub model: Option<String>,
    pub thinking_level: ThinkingLevel,
    pub delivery_context: Option<String>,
    pub group_id: Option<String>,
    pub agent_id: String,
    pub channel_id: String,
    pub peer_id: String,
    pub updated_at: String,
}

impl SessionState {
    pub fn new(key: &SessionKey) -> Self {
        Self {
            model: None,
            thinking_level: ThinkingLevel::default(),
            delivery_context: None,
            group_id: None,
            agent_id: key.agent_id.clone(),
            channel_id: key.channel_id.clone(),
            peer_id: key.peer_id.clone(),
            updated_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Role of a transcript entry (§3 Transcript entry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// Traces where a bridged message originated (§3, GLOSSARY).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputProvenance {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_message_id: Option<String>,
}

/// One line of an on-disk `<session_key>.jsonl` transcript (§3, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub content: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_provenance: Option<InputProvenance>,
}

impl TranscriptEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            model: None,
            metadata: HashMap::new(),
            input_provenance: None,
        }
    }
}
