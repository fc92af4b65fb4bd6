//! Plain-text markdown memory backend (C8 alt): tab-delimited lines under
//! `<workspace>/MEMORY.md` (core) and `<workspace>/memory/<YYYY-MM-DD>.md`
//! (everything else). No embeddings or FTS — `recall` is a case-insensitive
//! substring filter.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;
use crate::memory::Memory;
use crate::types::{now_rfc3339, MemoryCategory, MemoryEntry, MemoryStats};

fn escape_field(value: &str) -> String {
    value.replace('\n', "\t")
}

fn unescape_field(value: &str) -> String {
    value.replace('\t', "\n")
}

pub struct MarkdownMemory {
    workspace: PathBuf,
    write_lock: Mutex<()>,
}

impl MarkdownMemory {
    pub fn new(workspace: impl AsRef<Path>) -> Result<Self> {
        let workspace = workspace.as_ref().to_path_buf();
        std::fs::create_dir_all(workspace.join("memory"))?;
        Ok(Self {
            workspace,
            write_lock: Mutex::new(()),
        })
    }

    fn path_for_category(&self, category: MemoryCategory) -> PathBuf {
        if category == MemoryCategory::Core {
            return self.workspace.join("MEMORY.md");
        }
        let today = chrono::Utc::now().format("%Y-%m-%d");
        self.workspace.join("memory").join(format!("{today}.md"))
    }

    fn append_entry(&self, path: &Path, entry: &MemoryEntry) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let _guard = self.write_lock.lock().expect("write lock poisoned");
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(
            file,
            "{}\t{}\t{}\t{}\t{}",
            escape_field(&entry.key),
            entry.category.as_str(),
            escape_field(&entry.created_at),
            escape_field(&entry.updated_at),
            escape_field(&entry.content),
        )?;
        Ok(())
    }

    fn load_file(path: &Path, out: &mut Vec<MemoryEntry>) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }
        let content = std::fs::read_to_string(path)?;
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 5 {
                continue;
            }
            out.push(MemoryEntry {
                key: unescape_field(fields[0]),
                category: MemoryCategory::parse(fields[1]),
                created_at: unescape_field(fields[2]),
                updated_at: unescape_field(fields[3]),
                content: unescape_field(fields[4]),
                score: None,
                source_file: Some(path.display().to_string()),
                heading: None,
            });
        }
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<MemoryEntry>> {
        let mut entries = Vec::new();
        Self::load_file(&self.workspace.join("MEMORY.md"), &mut entries)?;

        let memory_dir = self.workspace.join("memory");
        if memory_dir.exists() {
            for dir_entry in std::fs::read_dir(&memory_dir)? {
                let dir_entry = dir_entry?;
                if dir_entry.file_type()?.is_file() {
                    Self::load_file(&dir_entry.path(), &mut entries)?;
                }
            }
        }
        Ok(entries)
    }

    fn rewrite_all(&self, entries: &[MemoryEntry]) -> Result<()> {
        let _guard = self.write_lock.lock().expect("write lock poisoned");
        std::fs::write(self.workspace.join("MEMORY.md"), b"")?;
        let memory_dir = self.workspace.join("memory");
        if memory_dir.exists() {
            for dir_entry in std::fs::read_dir(&memory_dir)? {
                let dir_entry = dir_entry?;
                if dir_entry.file_type()?.is_file() {
                    std::fs::write(dir_entry.path(), b"")?;
                }
            }
        }
        drop(_guard);

        for entry in entries {
            let path = self.path_for_category(entry.category);
            self.append_entry(&path, entry)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Memory for MarkdownMemory {
    fn name(&self) -> &str {
        "markdown"
    }

    async fn store(&self, key: &str, content: &str, category: MemoryCategory) -> Result<()> {
        let now = now_rfc3339();
        let entry = MemoryEntry {
            key: key.to_string(),
            content: content.to_string(),
            category,
            created_at: now.clone(),
            updated_at: now,
            score: None,
            source_file: None,
            heading: None,
        };
        self.append_entry(&self.path_for_category(category), &entry)
    }

    async fn recall(&self, query: &str, limit: usize) -> Result<Vec<MemoryEntry>> {
        let mut entries = self.load_all()?;
        let needle = query.to_lowercase();
        entries.retain_mut(|entry| {
            let haystack = format!("{} {}", entry.content, entry.key).to_lowercase();
            let matches = query.is_empty() || haystack.contains(&needle);
            if matches {
                entry.score = Some(if query.is_empty() { 1.0 } else { 0.5 });
            }
            matches
        });
        entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        entries.truncate(limit);
        Ok(entries)
    }

    async fn get(&self, key: &str) -> Result<Option<MemoryEntry>> {
        let entries = self.load_all()?;
        Ok(entries.into_iter().find(|e| e.key == key))
    }

    async fn list(&self, category: Option<MemoryCategory>) -> Result<Vec<MemoryEntry>> {
        let entries = self.load_all()?;
        Ok(match category {
            Some(category) => entries.into_iter().filter(|e| e.category == category).collect(),
            None => entries,
        })
    }

    async fn forget(&self, key: &str) -> Result<bool> {
        let mut entries = self.load_all()?;
        let before = entries.len();
        entries.retain(|e| e.key != key);
        let removed = entries.len() != before;
        self.rewrite_all(&entries)?;
        Ok(removed)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.load_all()?.len())
    }

    async fn reindex(&self) -> Result<()> {
        Ok(())
    }

    async fn health_check(&self) -> bool {
        std::fs::create_dir_all(&self.workspace).is_ok()
    }

    async fn stats(&self) -> MemoryStats {
        let total_entries = self.count().await.unwrap_or(0);
        MemoryStats {
            total_entries,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, MarkdownMemory) {
        let dir = tempfile::tempdir().unwrap();
        let store = MarkdownMemory::new(dir.path()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn store_and_get_round_trips() {
        let (_dir, m) = store();
        m.store("k", "hello world", MemoryCategory::Core).await.unwrap();
        let entry = m.get("k").await.unwrap().unwrap();
        assert_eq!(entry.content, "hello world");
    }

    #[tokio::test]
    async fn non_core_entries_land_in_daily_file() {
        let (dir, m) = store();
        m.store("k", "note", MemoryCategory::Daily).await.unwrap();
        let today = chrono::Utc::now().format("%Y-%m-%d");
        assert!(dir.path().join("memory").join(format!("{today}.md")).exists());
    }

    #[tokio::test]
    async fn recall_filters_by_substring_case_insensitively() {
        let (_dir, m) = store();
        m.store("a", "The Quick Brown Fox", MemoryCategory::Core).await.unwrap();
        m.store("b", "unrelated content", MemoryCategory::Core).await.unwrap();
        let found = m.recall("quick brown", 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key, "a");
    }

    #[tokio::test]
    async fn forget_rewrites_remaining_entries() {
        let (_dir, m) = store();
        m.store("a", "keep", MemoryCategory::Core).await.unwrap();
        m.store("b", "drop", MemoryCategory::Core).await.unwrap();
        assert!(m.forget("b").await.unwrap());
        assert!(m.get("b").await.unwrap().is_none());
        assert!(m.get("a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn multiline_content_survives_round_trip() {
        let (_dir, m) = store();
        m.store("k", "line one\nline two", MemoryCategory::Core).await.unwrap();
        let entry = m.get("k").await.unwrap().unwrap();
        assert_eq!(entry.content, "line one\nline two");
    }
}
