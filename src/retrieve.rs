//! Top-k similarity retrieval over a knowledge base snapshot.
//!
//! Brute-force O(n) cosine scan. The corpus is curated (hundreds of
//! entries, not millions), so a linear pass is cheap; an ANN index could
//! replace [`rank_matches`] behind the same contract if that changes.

use tracing::info;

use crate::error::RetrievalError;
use crate::kb::KnowledgeBaseSnapshot;
use crate::llm::EmbeddingProvider;
use crate::models::{RankedMatch, RepositoryRecord};

/// Embed the query with the snapshot's embedding function, then rank.
pub async fn retrieve(
    embedder: &dyn EmbeddingProvider,
    query: &RepositoryRecord,
    snapshot: &KnowledgeBaseSnapshot,
    k: usize,
) -> Result<Vec<RankedMatch>, RetrievalError> {
    if snapshot.is_empty() {
        return Err(RetrievalError::EmptySnapshot);
    }

    let query_embedding = embedder
        .embed(&query.corpus_text())
        .await
        .map_err(RetrievalError::Embedding)?;

    rank_matches(&query_embedding, snapshot, k)
}

/// Rank snapshot entries by cosine similarity to `query_embedding` and
/// return the top `min(k, n)`. Pure and deterministic: ties keep snapshot
/// order, and concurrent calls share the snapshot without synchronization.
pub fn rank_matches(
    query_embedding: &[f32],
    snapshot: &KnowledgeBaseSnapshot,
    k: usize,
) -> Result<Vec<RankedMatch>, RetrievalError> {
    if snapshot.is_empty() {
        return Err(RetrievalError::EmptySnapshot);
    }
    if query_embedding.len() != snapshot.embedding_dim {
        return Err(RetrievalError::DimensionMismatch {
            query: query_embedding.len(),
            snapshot: snapshot.embedding_dim,
        });
    }

    let mut scored: Vec<(f32, usize)> = snapshot
        .entries
        .iter()
        .enumerate()
        .map(|(i, entry)| (cosine_similarity(query_embedding, &entry.embedding), i))
        .collect();

    // Stable sort, descending: equal scores keep snapshot order
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k.min(snapshot.len()));

    let matches: Vec<RankedMatch> = scored
        .into_iter()
        .map(|(score, i)| {
            let entry = &snapshot.entries[i];
            RankedMatch {
                record: entry.record.clone(),
                structure: entry.structure.clone(),
                score,
            }
        })
        .collect();

    let scores: Vec<String> = matches.iter().map(|m| format!("{:.3}", m.score)).collect();
    info!(k = matches.len(), ?scores, "Retrieved similar repositories");

    Ok(matches)
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for i in 0..a.len() {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}
