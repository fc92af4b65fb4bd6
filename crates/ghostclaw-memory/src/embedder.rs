//! Embedder trait + backends (C5): OpenAI embeddings, deterministic local
//! hash-embedder, zero embedder.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use ghostclaw_core::http::HttpClient;

use crate::error::{MemoryError, Result};

#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
    fn dimensions(&self) -> usize;
}

/// Produces an all-zero vector of the target dimension — used when memory
/// is configured without any embedding backend.
pub struct NoopEmbedder {
    dimensions: usize,
}

impl NoopEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

#[async_trait]
impl Embedder for NoopEmbedder {
    fn name(&self) -> &str {
        "noop"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![0.0; self.dimensions])
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

const LOCAL_DIMENSIONS: usize = 256;

/// Deterministic, dependency-free embedder: hashes every suffix of the
/// input and scatters it into a fixed-width bucket, then L2-normalizes.
/// Not semantically meaningful, but stable and useful for tests and
/// offline operation.
pub struct LocalHashEmbedder;

#[async_trait]
impl Embedder for LocalHashEmbedder {
    fn name(&self) -> &str {
        "local"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let bytes = text.as_bytes();
        let mut values = vec![0.0_f32; LOCAL_DIMENSIONS];
        for i in 0..bytes.len() {
            let suffix = &bytes[i..];
            let mut hasher = DefaultHasher::new();
            suffix.hash(&mut hasher);
            let hash = hasher.finish();
            let idx = (hash as usize) % LOCAL_DIMENSIONS;
            values[idx] += hash_to_unit(hash);
        }
        normalize(&mut values);
        Ok(values)
    }

    fn dimensions(&self) -> usize {
        LOCAL_DIMENSIONS
    }
}

fn hash_to_unit(hash: u64) -> f32 {
    let normalized = hash as f64 / u64::MAX as f64;
    (normalized * 2.0 - 1.0) as f32
}

fn normalize(values: &mut [f32]) {
    let norm: f64 = values.iter().map(|v| (*v as f64) * (*v as f64)).sum::<f64>().sqrt();
    if norm < 1e-9 {
        return;
    }
    for v in values.iter_mut() {
        *v = (*v as f64 / norm) as f32;
    }
}

/// OpenAI `/v1/embeddings` backend.
pub struct OpenAiEmbedder {
    api_key: String,
    model: String,
    dimensions: usize,
    http: HttpClient,
}

impl OpenAiEmbedder {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, dimensions: usize, http: HttpClient) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            dimensions,
            http,
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn name(&self) -> &str {
        "openai"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.api_key.is_empty() {
            return Err(MemoryError::Embedder("missing API key".to_string()));
        }

        let body = serde_json::json!({ "model": self.model, "input": text });
        let response = self
            .http
            .inner()
            .post("https://api.openai.com/v1/embeddings")
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MemoryError::Embedder(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MemoryError::Embedder(format!("OpenAI embedding API error: {}", response.status())));
        }

        let parsed: serde_json::Value = response.json().await.map_err(|e| MemoryError::Embedder(e.to_string()))?;
        let values = parsed["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| MemoryError::Embedder("embedding field missing".to_string()))?;

        let mut out: Vec<f32> = values.iter().filter_map(|v| v.as_f64()).map(|v| v as f32).collect();
        out.resize(self.dimensions, 0.0);
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_embedder_produces_zero_vector_of_requested_dimension() {
        let embedder = NoopEmbedder::new(8);
        let v = embedder.embed("hello").await.unwrap();
        assert_eq!(v, vec![0.0; 8]);
    }

    #[tokio::test]
    async fn local_embedder_is_deterministic_and_unit_length() {
        let embedder = LocalHashEmbedder;
        let a = embedder.embed("hello world").await.unwrap();
        let b = embedder.embed("hello world").await.unwrap();
        assert_eq!(a, b);
        let norm: f64 = a.iter().map(|v| (*v as f64).powi(2)).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4 || norm == 0.0);
    }

    #[tokio::test]
    async fn local_embedder_differs_across_distinct_inputs() {
        let embedder = LocalHashEmbedder;
        let a = embedder.embed("alpha").await.unwrap();
        let b = embedder.embed("beta").await.unwrap();
        assert_ne!(a, b);
    }
}
