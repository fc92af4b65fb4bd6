use serde::{Deserialize, Serialize};

/// `{core,daily,conversation,custom}` (§3 Memory entry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryCategory {
    Core,
    Daily,
    Conversation,
    Custom,
}

impl std::fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MemoryCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Daily => "daily",
            Self::Conversation => "conversation",
            Self::Custom => "custom",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "core" => Self::Core,
            "daily" => Self::Daily,
            "conversation" => Self::Conversation,
            _ => Self::Custom,
        }
    }
}

/// `{ key, content, category, created_at, updated_at, score?, source_file?,
/// heading? }` (§3). Invariant: `updated_at >= created_at`; `created_at`
/// preserved across updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub key: String,
    pub content: String,
    pub category: MemoryCategory,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total_entries: usize,
    pub total_vectors: usize,
    pub cache_size: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

/// `{ entry, vector_score, keyword_score, recency, final_score }` (§3).
#[derive(Debug, Clone)]
pub struct RankedResult {
    pub entry: MemoryEntry,
    pub vector_score: f64,
    pub keyword_score: f64,
    pub recency: f64,
    pub final_score: f64,
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// `0.5^(age_days/half_life_days)`, clamped to `[0,1]` (strictly decreasing
/// in age — invariant 9).
pub fn recency_score(updated_at: &str, half_life_days: f64) -> f64 {
    let parsed = chrono::DateTime::parse_from_rfc3339(updated_at);
    let Ok(updated_at) = parsed else {
        return 0.0;
    };
    let age_days = chrono::Utc::now()
        .signed_duration_since(updated_at)
        .num_seconds() as f64
        / 86400.0;
    let age_days = age_days.max(0.0);
    if half_life_days <= 0.0 {
        return if age_days == 0.0 { 1.0 } else { 0.0 };
    }
    0.5_f64.powf(age_days / half_life_days).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recency_score_decreases_with_age() {
        let fresh = chrono::Utc::now().to_rfc3339();
        let old = (chrono::Utc::now() - chrono::Duration::days(30)).to_rfc3339();
        assert!(recency_score(&fresh, 14.0) > recency_score(&old, 14.0));
    }

    #[test]
    fn recency_score_is_clamped() {
        let future = (chrono::Utc::now() + chrono::Duration::days(1)).to_rfc3339();
        let score = recency_score(&future, 14.0);
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn malformed_timestamp_scores_zero() {
        assert_eq!(recency_score("not-a-date", 14.0), 0.0);
    }

    #[test]
    fn category_round_trips_through_as_str() {
        for cat in [
            MemoryCategory::Core,
            MemoryCategory::Daily,
            MemoryCategory::Conversation,
            MemoryCategory::Custom,
        ] {
            assert_eq!(MemoryCategory::parse(cat.as_str()), cat);
        }
    }
}
