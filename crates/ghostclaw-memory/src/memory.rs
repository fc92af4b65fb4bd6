//! Memory trait (C8): common interface shared by the SQLite and markdown
//! backends.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{MemoryCategory, MemoryEntry, MemoryStats};

#[async_trait]
pub trait Memory: Send + Sync {
    fn name(&self) -> &str;
    async fn store(&self, key: &str, content: &str, category: MemoryCategory) -> Result<()>;
    async fn recall(&self, query: &str, limit: usize) -> Result<Vec<MemoryEntry>>;
    async fn get(&self, key: &str) -> Result<Option<MemoryEntry>>;
    async fn list(&self, category: Option<MemoryCategory>) -> Result<Vec<MemoryEntry>>;
    async fn forget(&self, key: &str) -> Result<bool>;
    async fn count(&self) -> Result<usize>;
    async fn reindex(&self) -> Result<()>;
    async fn health_check(&self) -> bool;
    async fn stats(&self) -> MemoryStats;
}
