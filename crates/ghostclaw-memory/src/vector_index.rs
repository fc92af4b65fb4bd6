//! In-memory cosine-KNN vector index with flat-file persistence (C6).

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::{MemoryError, Result};

#[derive(Debug, Clone)]
pub struct VectorSearchResult {
    pub key: String,
    pub distance: f32,
    pub score: f32,
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += *x as f64 * *y as f64;
        norm_a += *x as f64 * *x as f64;
        norm_b += *y as f64 * *y as f64;
    }
    if norm_a < 1e-9 || norm_b < 1e-9 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32
}

/// A flat `key → unit-length float vector` map, brute-force cosine KNN.
/// `D` is fixed at construction; mismatched dimensions reject on add/search.
pub struct VectorIndex {
    dimensions: usize,
    max_elements: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl VectorIndex {
    pub fn new(dimensions: usize, max_elements: usize) -> Self {
        Self {
            dimensions,
            max_elements,
            vectors: HashMap::new(),
        }
    }

    pub fn add(&mut self, key: &str, embedding: Vec<f32>) -> Result<()> {
        if embedding.len() != self.dimensions {
            return Err(MemoryError::DimensionMismatch {
                expected: self.dimensions,
                got: embedding.len(),
            });
        }
        if !self.vectors.contains_key(key) && self.vectors.len() >= self.max_elements {
            return Err(MemoryError::IndexFull);
        }
        self.vectors.insert(key.to_string(), embedding);
        Ok(())
    }

    pub fn remove(&mut self, key: &str) {
        self.vectors.remove(key);
    }

    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<VectorSearchResult>> {
        if query.len() != self.dimensions {
            return Err(MemoryError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        let mut results: Vec<VectorSearchResult> = self
            .vectors
            .iter()
            .map(|(key, embedding)| {
                let similarity = cosine_similarity(query, embedding);
                VectorSearchResult {
                    key: key.clone(),
                    distance: 1.0 - similarity,
                    score: ((similarity + 1.0) / 2.0).clamp(0.0, 1.0),
                }
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        Ok(results)
    }

    pub fn size(&self) -> usize {
        self.vectors.len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vectors.contains_key(key)
    }

    /// Binary layout: `[dims:u64][count:u64]` then, per entry,
    /// `[key_len:u64][key bytes][dims × f32]`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut out = std::fs::File::create(path)?;
        out.write_all(&(self.dimensions as u64).to_le_bytes())?;
        out.write_all(&(self.vectors.len() as u64).to_le_bytes())?;
        for (key, embedding) in &self.vectors {
            out.write_all(&(key.len() as u64).to_le_bytes())?;
            out.write_all(key.as_bytes())?;
            for v in embedding {
                out.write_all(&v.to_le_bytes())?;
            }
        }
        Ok(())
    }

    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(());
        }
        let mut file = std::fs::File::open(path)?;
        let mut u64_buf = [0u8; 8];

        file.read_exact(&mut u64_buf)?;
        let dims = u64::from_le_bytes(u64_buf) as usize;
        file.read_exact(&mut u64_buf)?;
        let count = u64::from_le_bytes(u64_buf);

        if dims != self.dimensions {
            return Err(MemoryError::DimensionMismatch {
                expected: self.dimensions,
                got: dims,
            });
        }

        self.vectors.clear();
        for _ in 0..count {
            file.read_exact(&mut u64_buf)?;
            let key_len = u64::from_le_bytes(u64_buf) as usize;
            let mut key_buf = vec![0u8; key_len];
            file.read_exact(&mut key_buf)?;
            let key = String::from_utf8_lossy(&key_buf).into_owned();

            let mut embedding = Vec::with_capacity(self.dimensions);
            let mut f32_buf = [0u8; 4];
            for _ in 0..self.dimensions {
                file.read_exact(&mut f32_buf)?;
                embedding.push(f32::from_le_bytes(f32_buf));
            }
            self.vectors.insert(key, embedding);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_ranks_closer_vectors_first() {
        let mut index = VectorIndex::new(2, 10);
        index.add("a", vec![1.0, 0.0]).unwrap();
        index.add("b", vec![0.0, 1.0]).unwrap();
        let results = index.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(results[0].key, "a");
    }

    #[test]
    fn dimension_mismatch_rejects_add() {
        let mut index = VectorIndex::new(3, 10);
        assert!(matches!(
            index.add("a", vec![1.0, 0.0]),
            Err(MemoryError::DimensionMismatch { expected: 3, got: 2 })
        ));
    }

    #[test]
    fn full_index_rejects_new_keys_but_allows_updates() {
        let mut index = VectorIndex::new(1, 1);
        index.add("a", vec![1.0]).unwrap();
        assert!(index.add("a", vec![0.5]).is_ok());
        assert!(index.add("b", vec![0.5]).is_err());
    }

    #[test]
    fn save_and_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.bin");
        let mut index = VectorIndex::new(2, 10);
        index.add("a", vec![0.6, 0.8]).unwrap();
        index.save(&path).unwrap();

        let mut loaded = VectorIndex::new(2, 10);
        loaded.load(&path).unwrap();
        assert_eq!(loaded.size(), 1);
        assert!(loaded.contains("a"));
    }
}
