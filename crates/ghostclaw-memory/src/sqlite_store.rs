//! SQLite memory store (C8): CRUD + hybrid recall + embedding cache with
//! LRU trim.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};

use crate::embedder::Embedder;
use crate::error::{MemoryError, Result};
use crate::hybrid_ranker::HybridRanker;
use crate::memory::Memory;
use crate::types::{now_rfc3339, MemoryCategory, MemoryEntry, MemoryStats};
use crate::vector_index::{VectorIndex, VectorSearchResult};

fn sha256_hex(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    hex::encode(digest)
}

fn vector_to_blob(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn blob_to_vector(bytes: &[u8]) -> Vec<f32> {
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        return Vec::new();
    }
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

pub struct SqliteMemory {
    conn: Mutex<Connection>,
    embedder: Arc<dyn Embedder>,
    vector_index: Mutex<VectorIndex>,
    vector_weight: f64,
    keyword_weight: f64,
    embedding_cache_size: usize,
    stats: Mutex<MemoryStats>,
}

impl SqliteMemory {
    pub fn open(
        db_path: impl AsRef<Path>,
        embedder: Arc<dyn Embedder>,
        vector_weight: f64,
        keyword_weight: f64,
        embedding_cache_size: usize,
    ) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        init_schema(&conn)?;

        let dimensions = embedder.dimensions();
        let store = Self {
            conn: Mutex::new(conn),
            embedder,
            vector_index: Mutex::new(VectorIndex::new(dimensions, usize::MAX)),
            vector_weight,
            keyword_weight,
            embedding_cache_size,
            stats: Mutex::new(MemoryStats::default()),
        };
        store.reindex_blocking()?;
        Ok(store)
    }

    fn cached_embedding(&self, text_hash: &str) -> Result<Option<Vec<f32>>> {
        let conn = self.conn.lock().expect("db mutex poisoned");
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT embedding FROM embedding_cache WHERE text_hash = ?1",
                params![text_hash],
                |row| row.get(0),
            )
            .optional()?;
        let mut stats = self.stats.lock().expect("stats mutex poisoned");
        match blob {
            Some(b) => {
                stats.cache_hits += 1;
                Ok(Some(blob_to_vector(&b)))
            }
            None => {
                stats.cache_misses += 1;
                Ok(None)
            }
        }
    }

    fn cache_embedding(&self, text_hash: &str, embedding: &[f32]) -> Result<()> {
        let conn = self.conn.lock().expect("db mutex poisoned");
        let now = now_rfc3339();
        conn.execute(
            "INSERT OR REPLACE INTO embedding_cache(text_hash, embedding, created_at) VALUES (?1, ?2, ?3)",
            params![text_hash, vector_to_blob(embedding), now],
        )?;

        let cache_size: i64 = conn.query_row("SELECT COUNT(*) FROM embedding_cache", [], |row| row.get(0))?;
        let cache_size = cache_size as usize;
        if cache_size > self.embedding_cache_size {
            let overflow = cache_size - self.embedding_cache_size;
            conn.execute(
                "DELETE FROM embedding_cache WHERE text_hash IN (
                    SELECT text_hash FROM embedding_cache ORDER BY created_at ASC LIMIT ?1
                )",
                params![overflow as i64],
            )?;
        }
        self.stats.lock().expect("stats mutex poisoned").cache_size = cache_size.min(self.embedding_cache_size);
        Ok(())
    }

    /// Best-effort embedding lookup: cache hit, or embed-and-cache. Callers
    /// treat a returned `Err` as "no embedding available" rather than a
    /// hard failure (§4.7 store tolerance).
    async fn embedding_for_text(&self, text: &str) -> Result<Vec<f32>> {
        let hash = sha256_hex(text);
        if let Some(cached) = self.cached_embedding(&hash)? {
            return Ok(cached);
        }
        let embedding = self.embedder.embed(text).await?;
        self.cache_embedding(&hash, &embedding)?;
        Ok(embedding)
    }

    fn load_entries_by_keys(&self, keys: &[String]) -> Result<HashMap<String, MemoryEntry>> {
        let conn = self.conn.lock().expect("db mutex poisoned");
        let mut out = HashMap::new();
        for key in keys {
            let entry = conn
                .query_row(
                    "SELECT key, content, category, created_at, updated_at FROM memories WHERE key = ?1",
                    params![key],
                    row_to_entry,
                )
                .optional()?;
            if let Some(entry) = entry {
                out.insert(entry.key.clone(), entry);
            }
        }
        Ok(out)
    }

    fn reindex_blocking(&self) -> Result<()> {
        let conn = self.conn.lock().expect("db mutex poisoned");
        let mut index = self.vector_index.lock().expect("vector index mutex poisoned");
        *index = VectorIndex::new(self.embedder.dimensions(), usize::MAX);

        let mut stmt = conn.prepare("SELECT key, embedding FROM memories")?;
        let rows = stmt.query_map([], |row| {
            let key: String = row.get(0)?;
            let blob: Option<Vec<u8>> = row.get(1)?;
            Ok((key, blob))
        })?;
        for row in rows {
            let (key, blob) = row?;
            if let Some(blob) = blob {
                let vector = blob_to_vector(&blob);
                if vector.len() == self.embedder.dimensions() {
                    index.add(&key, vector).ok();
                }
            }
        }
        Ok(())
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
        CREATE TABLE IF NOT EXISTS memories (
            key TEXT PRIMARY KEY,
            content TEXT NOT NULL,
            category TEXT NOT NULL DEFAULT 'core',
            embedding BLOB,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
            key, content, category,
            content=memories, content_rowid=rowid
        );
        CREATE TRIGGER IF NOT EXISTS memories_ai AFTER INSERT ON memories BEGIN
            INSERT INTO memories_fts(rowid, key, content, category)
            VALUES (new.rowid, new.key, new.content, new.category);
        END;
        CREATE TRIGGER IF NOT EXISTS memories_ad AFTER DELETE ON memories BEGIN
            INSERT INTO memories_fts(memories_fts, rowid, key, content, category)
            VALUES ('delete', old.rowid, old.key, old.content, old.category);
        END;
        CREATE TRIGGER IF NOT EXISTS memories_au AFTER UPDATE ON memories BEGIN
            INSERT INTO memories_fts(memories_fts, rowid, key, content, category)
            VALUES ('delete', old.rowid, old.key, old.content, old.category);
            INSERT INTO memories_fts(rowid, key, content, category)
            VALUES (new.rowid, new.key, new.content, new.category);
        END;
        CREATE TABLE IF NOT EXISTS embedding_cache (
            text_hash TEXT PRIMARY KEY,
            embedding BLOB NOT NULL,
            created_at TEXT NOT NULL
        );",
    )?;
    Ok(())
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryEntry> {
    let category: String = row.get(2)?;
    Ok(MemoryEntry {
        key: row.get(0)?,
        content: row.get(1)?,
        category: MemoryCategory::parse(&category),
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
        score: None,
        source_file: None,
        heading: None,
    })
}

#[async_trait]
impl Memory for SqliteMemory {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn store(&self, key: &str, content: &str, category: MemoryCategory) -> Result<()> {
        let embedding = self.embedding_for_text(content).await.ok();

        let conn = self.conn.lock().expect("db mutex poisoned");
        let now = now_rfc3339();
        let created_at: Option<String> = conn
            .query_row("SELECT created_at FROM memories WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        let created_at = created_at.unwrap_or_else(|| now.clone());

        conn.execute(
            "INSERT INTO memories(key, content, category, embedding, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(key) DO UPDATE SET
               content = excluded.content,
               category = excluded.category,
               embedding = excluded.embedding,
               updated_at = excluded.updated_at",
            params![
                key,
                content,
                category.as_str(),
                embedding.as_deref().map(vector_to_blob),
                created_at,
                now,
            ],
        )?;
        drop(conn);

        let mut index = self.vector_index.lock().expect("vector index mutex poisoned");
        match embedding {
            Some(e) => {
                index.add(key, e)?;
            }
            None => index.remove(key),
        }
        Ok(())
    }

    async fn recall(&self, query: &str, limit: usize) -> Result<Vec<MemoryEntry>> {
        if query.is_empty() {
            let conn = self.conn.lock().expect("db mutex poisoned");
            let mut stmt = conn.prepare(
                "SELECT key, content, category, created_at, updated_at FROM memories
                 ORDER BY updated_at DESC LIMIT ?1",
            )?;
            let entries = stmt
                .query_map(params![limit as i64], row_to_entry)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            return Ok(entries);
        }

        let vector_results: Vec<VectorSearchResult> = match self.embedding_for_text(query).await {
            Ok(embedding) => {
                let index = self.vector_index.lock().expect("vector index mutex poisoned");
                index.search(&embedding, limit * 3).unwrap_or_default()
            }
            Err(_) => Vec::new(),
        };

        let (keyword_results, mut keys) = {
            let conn = self.conn.lock().expect("db mutex poisoned");
            let mut keyword_results: Vec<(String, f64)> = Vec::new();

            let fts_outcome: rusqlite::Result<Vec<(String, f64)>> = (|| {
                let mut stmt = conn.prepare(
                    "SELECT key, bm25(memories_fts) FROM memories_fts WHERE memories_fts MATCH ?1 LIMIT ?2",
                )?;
                stmt.query_map(params![query, (limit * 3) as i64], |row| {
                    let key: String = row.get(0)?;
                    let bm25: f64 = row.get(1)?;
                    Ok((key, 1.0 / (1.0 + bm25.max(0.0))))
                })?
                .collect()
            })();
            if let Ok(rows) = fts_outcome {
                keyword_results = rows;
            }

            if keyword_results.is_empty() {
                let pattern = format!("%{query}%");
                let mut stmt = conn.prepare(
                    "SELECT key FROM memories WHERE content LIKE ?1 OR key LIKE ?1
                     ORDER BY updated_at DESC LIMIT ?2",
                )?;
                let like_keys: Vec<String> = stmt
                    .query_map(params![pattern, (limit * 3) as i64], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                keyword_results = like_keys
                    .into_iter()
                    .enumerate()
                    .map(|(ordinal, key)| (key, 1.0 / (1.0 + ordinal as f64)))
                    .collect();
            }

            let mut keys: Vec<String> = vector_results.iter().map(|r| r.key.clone()).collect();
            keys.extend(keyword_results.iter().map(|(k, _)| k.clone()));
            (keyword_results, keys)
        };

        keys.sort();
        keys.dedup();

        let entries_by_key = self.load_entries_by_keys(&keys)?;
        let ranker = HybridRanker::new(self.vector_weight, self.keyword_weight, 0.1);
        let ranked = ranker.rank(&vector_results, &keyword_results, &entries_by_key, limit);
        Ok(ranked.into_iter().map(|r| r.entry).collect())
    }

    async fn get(&self, key: &str) -> Result<Option<MemoryEntry>> {
        let conn = self.conn.lock().expect("db mutex poisoned");
        let entry = conn
            .query_row(
                "SELECT key, content, category, created_at, updated_at FROM memories WHERE key = ?1",
                params![key],
                row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    async fn list(&self, category: Option<MemoryCategory>) -> Result<Vec<MemoryEntry>> {
        let conn = self.conn.lock().expect("db mutex poisoned");
        let entries = match category {
            Some(category) => {
                let mut stmt = conn.prepare(
                    "SELECT key, content, category, created_at, updated_at FROM memories
                     WHERE category = ?1 ORDER BY updated_at DESC",
                )?;
                stmt.query_map(params![category.as_str()], row_to_entry)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT key, content, category, created_at, updated_at FROM memories
                     ORDER BY updated_at DESC",
                )?;
                stmt.query_map([], row_to_entry)?.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(entries)
    }

    async fn forget(&self, key: &str) -> Result<bool> {
        let conn = self.conn.lock().expect("db mutex poisoned");
        let removed = conn.execute("DELETE FROM memories WHERE key = ?1", params![key])? > 0;
        drop(conn);
        if removed {
            self.vector_index.lock().expect("vector index mutex poisoned").remove(key);
        }
        Ok(removed)
    }

    async fn count(&self) -> Result<usize> {
        let conn = self.conn.lock().expect("db mutex poisoned");
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    async fn reindex(&self) -> Result<()> {
        self.reindex_blocking()
    }

    async fn health_check(&self) -> bool {
        let conn = self.conn.lock().expect("db mutex poisoned");
        conn.query_row("SELECT 1", [], |_| Ok(())).is_ok()
    }

    async fn stats(&self) -> MemoryStats {
        let total_entries = self.count().await.unwrap_or(0);
        let mut stats = self.stats.lock().expect("stats mutex poisoned").clone();
        stats.total_entries = total_entries;
        stats.total_vectors = self.vector_index.lock().expect("vector index mutex poisoned").size();
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::LocalHashEmbedder;

    fn store() -> (tempfile::TempDir, SqliteMemory) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brain.db");
        let embedder: Arc<dyn Embedder> = Arc::new(LocalHashEmbedder);
        let store = SqliteMemory::open(path, embedder, 0.6, 0.3, 100).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn store_then_get_round_trips() {
        let (_dir, m) = store();
        m.store("fact:1", "the sky is blue", MemoryCategory::Core).await.unwrap();
        let entry = m.get("fact:1").await.unwrap().unwrap();
        assert_eq!(entry.content, "the sky is blue");
        assert_eq!(entry.created_at, entry.updated_at);
    }

    #[tokio::test]
    async fn update_preserves_created_at() {
        let (_dir, m) = store();
        m.store("fact:1", "v1", MemoryCategory::Core).await.unwrap();
        let first = m.get("fact:1").await.unwrap().unwrap();
        m.store("fact:1", "v2", MemoryCategory::Core).await.unwrap();
        let second = m.get("fact:1").await.unwrap().unwrap();
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.content, "v2");
        assert!(second.updated_at >= second.created_at);
    }

    #[tokio::test]
    async fn forget_removes_entry_and_vector() {
        let (_dir, m) = store();
        m.store("fact:1", "temporary", MemoryCategory::Core).await.unwrap();
        assert!(m.forget("fact:1").await.unwrap());
        assert!(m.get("fact:1").await.unwrap().is_none());
        assert!(!m.forget("fact:1").await.unwrap());
    }

    #[tokio::test]
    async fn empty_query_recall_returns_recent_first() {
        let (_dir, m) = store();
        m.store("a", "first", MemoryCategory::Core).await.unwrap();
        m.store("b", "second", MemoryCategory::Core).await.unwrap();
        let recalled = m.recall("", 10).await.unwrap();
        assert_eq!(recalled.len(), 2);
    }

    #[tokio::test]
    async fn keyword_recall_finds_matching_content() {
        let (_dir, m) = store();
        m.store("pet", "the user has a golden retriever named Max", MemoryCategory::Custom).await.unwrap();
        let recalled = m.recall("retriever", 5).await.unwrap();
        assert!(recalled.iter().any(|e| e.key == "pet"));
    }

    #[tokio::test]
    async fn reindex_rebuilds_vector_index() {
        let (_dir, m) = store();
        m.store("a", "hello", MemoryCategory::Core).await.unwrap();
        m.reindex().await.unwrap();
        let stats = m.stats().await;
        assert_eq!(stats.total_vectors, 1);
    }
}
