//! Hybrid ranker (C7): weighted combine of vector + keyword + recency.

use std::collections::HashMap;

use crate::types::{recency_score, MemoryEntry, RankedResult};
use crate::vector_index::VectorSearchResult;

pub struct HybridRanker {
    vector_weight: f64,
    keyword_weight: f64,
    recency_weight: f64,
}

impl HybridRanker {
    pub fn new(vector_weight: f64, keyword_weight: f64, recency_weight: f64) -> Self {
        Self {
            vector_weight,
            keyword_weight,
            recency_weight,
        }
    }

    /// Ranks the union of `entries` (not just those with vector/keyword
    /// hits), descending by `final_score`, truncated to `limit`.
    pub fn rank(
        &self,
        vector_results: &[VectorSearchResult],
        keyword_results: &[(String, f64)],
        entries: &HashMap<String, MemoryEntry>,
        limit: usize,
    ) -> Vec<RankedResult> {
        let vector_by_key: HashMap<&str, f32> =
            vector_results.iter().map(|r| (r.key.as_str(), r.score)).collect();
        let keyword_by_key: HashMap<&str, f64> =
            keyword_results.iter().map(|(k, s)| (k.as_str(), *s)).collect();

        let mut ranked: Vec<RankedResult> = entries
            .values()
            .map(|entry| {
                let vector_score = vector_by_key.get(entry.key.as_str()).copied().unwrap_or(0.0) as f64;
                let keyword_score = keyword_by_key.get(entry.key.as_str()).copied().unwrap_or(0.0);
                let recency = recency_score(&entry.updated_at, 14.0);
                let final_score =
                    self.vector_weight * vector_score + self.keyword_weight * keyword_score + self.recency_weight * recency;
                let mut entry = entry.clone();
                entry.score = Some(final_score);
                RankedResult {
                    entry,
                    vector_score,
                    keyword_score,
                    recency,
                    final_score,
                }
            })
            .collect();

        ranked.sort_by(|a, b| b.final_score.partial_cmp(&a.final_score).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(limit);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemoryCategory;

    fn entry(key: &str, updated_at: &str) -> MemoryEntry {
        MemoryEntry {
            key: key.to_string(),
            content: "content".to_string(),
            category: MemoryCategory::Core,
            created_at: updated_at.to_string(),
            updated_at: updated_at.to_string(),
            score: None,
            source_file: None,
            heading: None,
        }
    }

    #[test]
    fn ranks_by_combined_score_descending() {
        let now = chrono::Utc::now().to_rfc3339();
        let mut entries = HashMap::new();
        entries.insert("a".to_string(), entry("a", &now));
        entries.insert("b".to_string(), entry("b", &now));

        let vector_results = vec![VectorSearchResult {
            key: "a".to_string(),
            distance: 0.1,
            score: 0.9,
        }];
        let ranker = HybridRanker::new(0.7, 0.2, 0.1);
        let ranked = ranker.rank(&vector_results, &[], &entries, 10);
        assert_eq!(ranked[0].entry.key, "a");
    }

    #[test]
    fn truncates_to_limit() {
        let now = chrono::Utc::now().to_rfc3339();
        let mut entries = HashMap::new();
        for i in 0..5 {
            let key = format!("k{i}");
            entries.insert(key.clone(), entry(&key, &now));
        }
        let ranker = HybridRanker::new(0.7, 0.2, 0.1);
        let ranked = ranker.rank(&[], &[], &entries, 2);
        assert_eq!(ranked.len(), 2);
    }

    #[test]
    fn entries_with_no_hits_still_rank_via_recency() {
        let now = chrono::Utc::now().to_rfc3339();
        let mut entries = HashMap::new();
        entries.insert("solo".to_string(), entry("solo", &now));
        let ranker = HybridRanker::new(0.7, 0.2, 0.1);
        let ranked = ranker.rank(&[], &[], &entries, 10);
        assert_eq!(ranked.len(), 1);
        assert!(ranked[0].final_score > 0.0);
    }
}
