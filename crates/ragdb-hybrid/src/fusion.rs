//! Rank-damped score fusion.
//!
//! Each sub-list contributes `weight * normalized_score / log2(rank + 1)` per
//! candidate (1-based rank). Candidates are merged on their whitespace-trimmed
//! content; a key missing from one list gets `0` from it.

use std::collections::HashMap;

use ragdb_core::error::{Error, Result};
use ragdb_core::types::{HybridHit, Metadata, ScoredPoint};
use ragdb_text::LexicalHit;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    pub vector: f32,
    pub lexical: f32,
}

impl Default for FusionWeights {
    /// Lexical favoured for keyword precision.
    fn default() -> Self {
        Self { vector: 0.3, lexical: 0.7 }
    }
}

impl FusionWeights {
    pub fn new(vector: f32, lexical: f32) -> Self {
        Self { vector, lexical }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, w) in [("vector", self.vector), ("lexical", self.lexical)] {
            if !w.is_finite() || w < 0.0 {
                return Err(Error::Validation(format!("{name} weight must be finite and >= 0, got {w}")));
            }
        }
        Ok(())
    }
}

/// Cosine similarity `[-1, 1]` → `[0, 1]`.
pub fn normalize_vector(similarity: f32) -> f32 {
    ((similarity + 1.0) / 2.0).max(0.0)
}

/// Compresses unbounded BM25 scores.
pub fn normalize_lexical(score: f32) -> f32 {
    score.max(0.0).ln_1p()
}

/// `1 / log2(rank + 1)`; `1.0` at rank 1.
pub fn rank_damping(rank: usize) -> f32 {
    1.0 / ((rank + 1) as f32).log2()
}

struct Candidate {
    content: String,
    metadata: Metadata,
    vector: f32,
    lexical: f32,
    seen_vector: bool,
    seen_lexical: bool,
}

/// Merge both ranked lists into at most `k` hits, best first.
///
/// Equal combined scores keep first-encounter order (vector list, then lexical
/// list). A key repeated within one list only counts at its first position.
pub fn fuse(vector_hits: &[ScoredPoint], lexical_hits: &[LexicalHit], weights: FusionWeights, k: usize) -> Vec<HybridHit> {
    let mut order: Vec<Candidate> = Vec::with_capacity(vector_hits.len() + lexical_hits.len());
    let mut by_key: HashMap<String, usize> = HashMap::new();

    let mut slot = |content: &str, metadata: &Metadata, order: &mut Vec<Candidate>| -> usize {
        let key = content.trim();
        if let Some(&i) = by_key.get(key) {
            return i;
        }
        order.push(Candidate { content: content.to_string(), metadata: metadata.clone(), vector: 0.0, lexical: 0.0, seen_vector: false, seen_lexical: false });
        by_key.insert(key.to_string(), order.len() - 1);
        order.len() - 1
    };

    for (i, hit) in vector_hits.iter().enumerate() {
        let idx = slot(&hit.content, &hit.metadata, &mut order);
        let c = &mut order[idx];
        if c.seen_vector { continue; }
        c.seen_vector = true;
        c.vector = weights.vector * normalize_vector(hit.score) * rank_damping(i + 1);
    }
    for (i, hit) in lexical_hits.iter().enumerate() {
        let idx = slot(&hit.text, &hit.metadata, &mut order);
        let c = &mut order[idx];
        if c.seen_lexical { continue; }
        c.seen_lexical = true;
        c.lexical = weights.lexical * normalize_lexical(hit.score) * rank_damping(i + 1);
    }

    let mut hits: Vec<HybridHit> = order
        .into_iter()
        .map(|c| HybridHit { content: c.content, metadata: c.metadata, vector_score: c.vector, bm25_score: c.lexical, combined_score: c.vector + c.lexical })
        .collect();
    // sort_by is stable
    hits.sort_by(|a, b| b.combined_score.total_cmp(&a.combined_score));
    hits.truncate(k);
    hits
}
