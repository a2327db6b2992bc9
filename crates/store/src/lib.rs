//! Document store implementations for Carwise.
//!
//! The store holds embedded chunks of automotive documents and answers
//! similarity queries for the knowledge base tier.

pub mod chunker;
pub mod embedder;
pub mod ingest;
pub mod jsonl;
pub mod vector;

#[cfg(test)]
mod test_support;

pub use chunker::{split_text, ChunkConfig};
pub use embedder::{DisabledEmbedder, Embedder, ProviderEmbedder};
pub use ingest::{IngestReport, Ingestor};
pub use jsonl::JsonlStore;
pub use vector::cosine_similarity;
