//! Turning chunks into vector points.

use std::collections::HashMap;
use tracing::{debug, warn};

use ragdb_core::error::{EmbedError, Error, IngestionError, Result};
use ragdb_core::hashing::pseudo_embedding;
use ragdb_core::traits::Embedder;
use ragdb_core::types::{Chunk, IndexedPoint};

/// Reject empty batches and blank chunks before any I/O.
pub fn validate_batch(chunks: &[Chunk]) -> Result<()> {
    if chunks.is_empty() {
        return Err(Error::Validation("cannot ingest an empty batch".into()));
    }
    if let Some(i) = chunks.iter().position(|c| c.content.trim().is_empty()) {
        return Err(Error::Validation(format!("chunk {i} has empty content")));
    }
    Ok(())
}

/// Embed `text`, substituting the content-hash pseudo embedding when the
/// provider is unavailable. The flag reports whether the fallback was used.
pub fn embed_or_fallback(embedder: &dyn Embedder, text: &str) -> std::result::Result<(Vec<f32>, bool), EmbedError> {
    match embedder.embed_text(text) {
        Ok(v) => Ok((v, false)),
        Err(EmbedError::Unavailable(reason)) => {
            debug!(%reason, "embedding provider unavailable; using pseudo embedding");
            Ok((pseudo_embedding(text), true))
        }
        Err(e) => Err(e),
    }
}

/// One point per chunk, in input order, all of the same dimension.
pub fn embed_chunks(embedder: &dyn Embedder, chunks: &[Chunk]) -> std::result::Result<Vec<IndexedPoint>, IngestionError> {
    let mut points = Vec::with_capacity(chunks.len());
    let mut fallbacks = 0usize;
    for chunk in chunks {
        let (vector, fell_back) = embed_or_fallback(embedder, &chunk.content)?;
        if vector.is_empty() {
            return Err(IngestionError::Embedding(format!("{} returned an empty vector", embedder.id())));
        }
        if let Some(first) = points.first().map(|p: &IndexedPoint| p.vector.len()) {
            if vector.len() != first {
                return Err(IngestionError::DimensionMismatch { expected: first, actual: vector.len() });
            }
        }
        fallbacks += usize::from(fell_back);
        points.push(IndexedPoint::from_chunk(chunk, vector));
    }
    if fallbacks > 0 {
        warn!(fallbacks, total = chunks.len(), provider = embedder.id(), "embedding provider unavailable; stored pseudo embeddings");
    }
    Ok(points)
}

/// Collapse points sharing an id; the last write wins, the first position is kept.
pub fn dedup_points(points: Vec<IndexedPoint>) -> Vec<IndexedPoint> {
    let mut slots: HashMap<u64, usize> = HashMap::new();
    let mut out: Vec<IndexedPoint> = Vec::with_capacity(points.len());
    for p in points {
        match slots.get(&p.id) {
            Some(&i) => out[i] = p,
            None => {
                slots.insert(p.id, out.len());
                out.push(p);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragdb_core::hashing::PSEUDO_EMBEDDING_DIM;
    use ragdb_embed::{FakeEmbedder, UnavailableEmbedder};

    struct Flaky;

    impl Embedder for Flaky {
        fn id(&self) -> &str { "flaky" }
        fn embed_text(&self, text: &str) -> std::result::Result<Vec<f32>, EmbedError> {
            if text.starts_with("down") { Err(EmbedError::Unavailable("offline".into())) } else { Ok(vec![1.0; 4]) }
        }
    }

    #[test]
    fn blank_content_is_rejected() {
        assert!(matches!(validate_batch(&[]), Err(Error::Validation(_))));
        assert!(matches!(validate_batch(&[Chunk::new("ok"), Chunk::new("  ")]), Err(Error::Validation(_))));
        assert!(validate_batch(&[Chunk::new("ok")]).is_ok());
    }

    #[test]
    fn unavailable_provider_falls_back_to_pseudo_embedding() {
        let points = embed_chunks(&UnavailableEmbedder::new("offline"), &[Chunk::new("alpha"), Chunk::new("beta")]).expect("points");
        assert!(points.iter().all(|p| p.vector.len() == PSEUDO_EMBEDDING_DIM));
        assert_eq!(points[0].vector, pseudo_embedding("alpha"));
    }

    #[test]
    fn mixed_dimensions_fail_the_batch() {
        let err = embed_chunks(&Flaky, &[Chunk::new("up"), Chunk::new("down")]).unwrap_err();
        assert!(matches!(err, IngestionError::DimensionMismatch { expected: 4, actual: 16 }));
    }

    #[test]
    fn provider_failure_is_an_embedding_error() {
        let err = embed_chunks(&FakeEmbedder::new(0), &[Chunk::new("x")]).unwrap_err();
        assert!(matches!(err, IngestionError::Embedding(_)));
    }

    #[test]
    fn duplicate_ids_collapse_to_last_write() {
        let a1 = IndexedPoint::from_chunk(&Chunk::new("a").with_meta("v", 1i64), vec![1.0]);
        let b = IndexedPoint::from_chunk(&Chunk::new("b"), vec![1.0]);
        let a2 = IndexedPoint::from_chunk(&Chunk::new("a").with_meta("v", 2i64), vec![1.0]);
        let out = dedup_points(vec![a1, b, a2.clone()]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], a2);
    }
}
