//! Memory subsystem (C5-C8): embedders, vector index, hybrid ranking, and
//! the SQLite/markdown memory backends.

pub mod embedder;
pub mod error;
pub mod hybrid_ranker;
pub mod markdown_store;
pub mod memory;
pub mod sqlite_store;
pub mod types;
pub mod vector_index;

pub use embedder::{Embedder, LocalHashEmbedder, NoopEmbedder, OpenAiEmbedder};
pub use error::{MemoryError, Result};
pub use hybrid_ranker::HybridRanker;
pub use markdown_store::MarkdownMemory;
pub use memory::Memory;
pub use sqlite_store::SqliteMemory;
pub use types::{now_rfc3339, recency_score, MemoryCategory, MemoryEntry, MemoryStats, RankedResult};
pub use vector_index::{cosine_similarity, VectorIndex, VectorSearchResult};
