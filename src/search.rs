//! Brute-force cosine similarity search over stored embeddings.
//!
//! O(N·D) full scan per query, which is fine at single-user scale. The
//! similarity is computed over the overlapping prefix of the two vectors
//! so rows embedded at an older dimension still rank instead of erroring.

use std::cmp::Ordering;

use serde::Serialize;

use crate::core::errors::ApiError;
use crate::store::SqliteStore;

pub const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub score: f32,
}

/// A missing or zero `top_k` means "use the default", not "return
/// nothing".
pub fn resolve_top_k(requested: Option<usize>) -> usize {
    requested.filter(|k| *k > 0).unwrap_or(DEFAULT_TOP_K)
}

pub async fn search(
    store: &SqliteStore,
    query: &[f32],
    top_k: usize,
    collection_id: Option<&str>,
) -> Result<Vec<SearchHit>, ApiError> {
    let rows = store.load_embeddings(collection_id).await?;

    let mut hits: Vec<SearchHit> = rows
        .into_iter()
        .filter_map(|row| {
            let score = cosine_prefix(query, &row.vector)?;
            Some(SearchHit {
                chunk_id: row.chunk_id,
                score,
            })
        })
        .collect();

    // Stable sort keeps row order on score ties.
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    hits.truncate(top_k);
    Ok(hits)
}

/// Cosine similarity over `min(len(a), len(b))` components.
///
/// Returns `None` for degenerate input (empty overlap or a zero-norm
/// vector) so callers skip the row instead of producing NaN.
pub fn cosine_prefix(a: &[f32], b: &[f32]) -> Option<f32> {
    let n = a.len().min(b.len());
    if n == 0 {
        return None;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for i in 0..n {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f32::EPSILON {
        return None;
    }
    Some(dot / denom)
}
