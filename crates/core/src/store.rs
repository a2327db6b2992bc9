//! Document store trait for the local automotive knowledge base.
//!
//! The store holds embedded text chunks and answers similarity queries.
//! It is read-only at query time; `upsert` and `replace_source` are used by
//! ingestion only.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::StoreError;

/// Smallest and largest `k` a search may ask for.
pub const MIN_TOP_K: usize = 1;
pub const MAX_TOP_K: usize = 10;

/// Clamp a requested result count into the supported range.
pub fn clamp_top_k(k: usize) -> usize {
    k.clamp(MIN_TOP_K, MAX_TOP_K)
}

/// One chunk returned by a similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// The chunk text
    pub text: String,

    /// Where the chunk came from (file name, URL)
    pub source: String,

    /// Relevance score in [0, 1], higher is better
    pub score: f32,

    /// Free-form metadata (chunk index, description, ...)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl RetrievedChunk {
    pub fn new(text: impl Into<String>, source: impl Into<String>, score: f32) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
            score,
            metadata: serde_json::Map::new(),
        }
    }
}

/// A chunk ready to be written into the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub text: String,
    pub source: String,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    /// Filled in by the store if absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Summary numbers for the `kb-stats` view.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub chunk_count: usize,
    pub sources: Vec<String>,
}

/// The core DocumentStore trait.
///
/// Implementations: the JSONL-backed vector store, and in-memory fakes for tests.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// The backend name (e.g., "jsonl").
    fn name(&self) -> &str;

    /// Top-`k` chunks for `query`, best first. `k` is clamped to 1..=10.
    ///
    /// An empty store yields an empty list. Connectivity failure yields
    /// `StoreError::Unavailable`, missing configuration `StoreError::NotConfigured`.
    async fn search(&self, query: &str, k: usize) -> std::result::Result<Vec<RetrievedChunk>, StoreError>;

    /// Insert or replace chunks. Returns how many were written.
    async fn upsert(&self, chunks: Vec<ChunkRecord>) -> std::result::Result<usize, StoreError>;

    /// Drop every chunk whose `source` matches, then write `chunks`.
    /// Returns how many were written. An empty `chunks` just removes.
    async fn replace_source(
        &self,
        source: &str,
        chunks: Vec<ChunkRecord>,
    ) -> std::result::Result<usize, StoreError>;

    /// Total chunk count.
    async fn count(&self) -> std::result::Result<usize, StoreError>;

    /// Remove every chunk.
    async fn clear(&self) -> std::result::Result<(), StoreError>;

    async fn stats(&self) -> std::result::Result<StoreStats, StoreError> {
        Ok(StoreStats {
            chunk_count: self.count().await?,
            sources: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_k_is_clamped() {
        assert_eq!(clamp_top_k(0), 1);
        assert_eq!(clamp_top_k(4), 4);
        assert_eq!(clamp_top_k(50), 10);
    }

    #[test]
    fn chunk_serialization_skips_empty_metadata() {
        let chunk = RetrievedChunk::new("Honda CR-V safety features", "crv.md", 0.82);
        let json = serde_json::to_string(&chunk).unwrap();
        assert!(json.contains("crv.md"));
        assert!(!json.contains("metadata"));
    }
}
