//! Deterministic embedder for unit tests.

use async_trait::async_trait;
use carwise_core::error::StoreError;

use crate::embedder::Embedder;

const DIMS: usize = 256;

/// Bag-of-words embedder: each lowercase word bumps one hashed bucket.
#[derive(Default)]
pub struct KeywordEmbedder;

fn fnv1a(word: &str) -> usize {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in word.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash % DIMS as u64) as usize
}

pub fn keyword_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0; DIMS];
    for word in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        v[fnv1a(word)] += 1.0;
    }
    v
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StoreError> {
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}
