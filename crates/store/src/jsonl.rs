//! JSONL-backed vector document store.
//!
//! Each line of the file is a JSON-encoded `ChunkRecord` including its
//! embedding. Records are loaded into memory on open and flushed to disk on
//! every mutation (upsert, clear). Searches embed the query and rank records
//! by cosine similarity.
//!
//! Default location: `~/.carwise/knowledge.jsonl`

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use carwise_core::error::StoreError;
use carwise_core::store::{clamp_top_k, ChunkRecord, DocumentStore, RetrievedChunk, StoreStats};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::embedder::Embedder;
use crate::vector::rank_by_similarity;

pub struct JsonlStore {
    /// `None` keeps everything in memory
    path: Option<PathBuf>,
    embedder: Arc<dyn Embedder>,
    records: RwLock<Vec<ChunkRecord>>,
}

impl JsonlStore {
    /// Open a store at `path`, loading any existing records.
    ///
    /// A missing file starts empty; it is created on the first write.
    pub fn open(path: impl Into<PathBuf>, embedder: Arc<dyn Embedder>) -> Result<Self, StoreError> {
        let path = path.into();
        let records = Self::load_from_disk(&path)?;
        debug!(path = %path.display(), count = records.len(), "Document store loaded");
        Ok(Self {
            path: Some(path),
            embedder,
            records: RwLock::new(records),
        })
    }

    /// A store that never touches the filesystem.
    pub fn in_memory(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            path: None,
            embedder,
            records: RwLock::new(Vec::new()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn load_from_disk(path: &Path) -> Result<Vec<ChunkRecord>, StoreError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::Unavailable(format!(
                    "cannot read {}: {e}",
                    path.display()
                )));
            }
        };

        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<ChunkRecord>(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(error = %e, "Skipping corrupted chunk record");
                    None
                }
            })
            .collect())
    }

    /// Fill in embeddings for chunks that arrived without one.
    async fn embed_missing(&self, chunks: &mut [ChunkRecord]) -> Result<(), StoreError> {
        let missing: Vec<String> = chunks
            .iter()
            .filter(|c| c.embedding.is_none())
            .map(|c| c.text.clone())
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let mut vectors = self.embedder.embed(&missing).await?.into_iter();
        for chunk in chunks.iter_mut().filter(|c| c.embedding.is_none()) {
            chunk.embedding = vectors.next();
        }
        Ok(())
    }

    /// Write all records to disk as JSONL.
    fn flush(&self, records: &[ChunkRecord]) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Storage(format!("Failed to create store directory: {e}"))
            })?;
        }

        let mut content = String::new();
        for record in records {
            let line = serde_json::to_string(record).map_err(|e| {
                StoreError::Storage(format!("Failed to serialize chunk: {e}"))
            })?;
            content.push_str(&line);
            content.push('\n');
        }

        std::fs::write(path, &content)
            .map_err(|e| StoreError::Storage(format!("Failed to write store file: {e}")))
    }
}

#[async_trait]
impl DocumentStore for JsonlStore {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>, StoreError> {
        let k = clamp_top_k(k);

        // An empty store answers without touching the embedder
        if self.records.read().await.is_empty() {
            return Ok(Vec::new());
        }

        let mut embeddings = self.embedder.embed(&[query.to_string()]).await?;
        let query_embedding = embeddings
            .pop()
            .ok_or_else(|| StoreError::EmbeddingFailed("no embedding for query".into()))?;

        let records = self.records.read().await;
        let results: Vec<RetrievedChunk> = rank_by_similarity(&records, &query_embedding, k)
            .into_iter()
            .map(|(score, record)| RetrievedChunk {
                text: record.text.clone(),
                source: record.source.clone(),
                score,
                metadata: record.metadata.clone(),
            })
            .collect();

        debug!(k, hits = results.len(), top = results.first().map(|c| c.score), "Store search");
        Ok(results)
    }

    async fn upsert(&self, mut chunks: Vec<ChunkRecord>) -> Result<usize, StoreError> {
        self.embed_missing(&mut chunks).await?;

        let written = chunks.len();
        let mut records = self.records.write().await;
        for chunk in chunks {
            match records.iter_mut().find(|r| r.id == chunk.id) {
                Some(existing) => *existing = chunk,
                None => records.push(chunk),
            }
        }
        self.flush(&records)?;
        Ok(written)
    }

    async fn replace_source(&self, source: &str, mut chunks: Vec<ChunkRecord>) -> Result<usize, StoreError> {
        // Embed before taking the lock so a failing embedder leaves the old chunks alone
        self.embed_missing(&mut chunks).await?;

        let written = chunks.len();
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.source != source);
        let removed = before - records.len();
        records.extend(chunks);
        self.flush(&records)?;

        debug!(source, removed, written, "Source replaced");
        Ok(written)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.records.read().await.len())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        records.clear();
        self.flush(&records)
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let records = self.records.read().await;
        let sources: BTreeSet<&str> = records.iter().map(|r| r.source.as_str()).collect();
        Ok(StoreStats {
            chunk_count: records.len(),
            sources: sources.into_iter().map(String::from).collect(),
        })
    }
}
