//! Vector similarity utilities.
//!
//! Pure-Rust cosine similarity and top-k ranking over stored chunks.

use carwise_core::store::ChunkRecord;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if either vector is zero-length, empty, or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Rank records by similarity to a query embedding, best first.
///
/// Scores are clamped to [0, 1] so they can be compared against a relevance
/// threshold. Records without an embedding are skipped.
pub fn rank_by_similarity<'a>(
    records: &'a [ChunkRecord],
    query_embedding: &[f32],
    limit: usize,
) -> Vec<(f32, &'a ChunkRecord)> {
    let mut scored: Vec<(f32, &ChunkRecord)> = records
        .iter()
        .filter_map(|record| {
            let emb = record.embedding.as_ref()?;
            let sim = cosine_similarity(emb, query_embedding).max(0.0);
            Some((sim, record))
        })
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    scored
}
