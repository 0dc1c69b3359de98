//! Hybrid retrieval: dense vectors and BM25 fused into one ranking.
//!
//! [`HybridEngine`] owns the lexical index, the ingestion ledger and a vector
//! backend. Writes go to the backend first and reach the lexical index only
//! after the upsert succeeded, so a failed batch leaves both stores untouched.
//! Reads never fail because a sub-search is empty or unavailable; they degrade
//! to whatever the other side found.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use ragdb_core::config::{EngineSettings, Settings};
use ragdb_core::error::{BackendError, Error, IngestionError, Result};
use ragdb_core::traits::{Embedder, VectorBackend};
use ragdb_core::types::{Chunk, HybridHit, IndexedPoint, ScoredPoint};
use ragdb_embed::get_default_embedder;
use ragdb_text::{LexicalHit, LexicalIndex};
use ragdb_vector::LanceBackend;

pub mod filter;
pub mod fusion;
pub mod ingest;
pub mod ledger;
pub mod lifecycle;

pub use filter::{MetadataFilter, QueryIntent};
pub use fusion::FusionWeights;
pub use ledger::{BatchRecord, EngineStats};

use crate::ingest::{dedup_points, embed_chunks, embed_or_fallback, validate_batch};
use crate::ledger::IngestionLedger;
use crate::lifecycle::{drop_collection, ensure_collection};

/// Points inspected by [`HybridEngine::search_by_metadata`] when no limit is given.
pub const DEFAULT_SCROLL_LIMIT: usize = 100;

pub struct HybridEngine<B: VectorBackend> {
    backend: B,
    embedder: Arc<dyn Embedder>,
    lexical: RwLock<LexicalIndex>,
    ledger: Mutex<IngestionLedger>,
    /// Serializes ingestion and clear.
    write_gate: Mutex<()>,
    settings: EngineSettings,
}

impl HybridEngine<LanceBackend> {
    /// Engine over the on-disk LanceDB store and the configured embedder.
    pub async fn open(settings: &Settings) -> Result<Self> {
        settings.validate()?;
        let backend = LanceBackend::open(&settings.storage.lancedb_path()).await?;
        let embedder = get_default_embedder(&settings.embedding);
        Self::new(backend, embedder, settings.engine.clone())
    }
}

impl<B: VectorBackend> HybridEngine<B> {
    pub fn new(backend: B, embedder: Box<dyn Embedder>, settings: EngineSettings) -> Result<Self> {
        let lexical = LexicalIndex::new(settings.bm25)?;
        info!(collection = %settings.collection_name, embedder = embedder.id(), "hybrid engine ready");
        Ok(Self {
            backend,
            embedder: Arc::from(embedder),
            lexical: RwLock::new(lexical),
            ledger: Mutex::new(IngestionLedger::default()),
            write_gate: Mutex::new(()),
            settings,
        })
    }

    pub fn settings(&self) -> &EngineSettings { &self.settings }

    pub fn backend(&self) -> &B { &self.backend }

    pub fn default_weights(&self) -> FusionWeights {
        FusionWeights::new(self.settings.vector_weight, self.settings.lexical_weight)
    }

    /// Ingest one batch atomically: embed, upsert, then append to the lexical index.
    #[instrument(skip_all, fields(chunks = chunks.len()))]
    pub async fn add_documents(&self, chunks: &[Chunk]) -> Result<()> {
        validate_batch(chunks)?;
        let _gate = self.write_gate.lock().await;
        let start = Instant::now();
        let name = self.settings.collection_name.as_str();

        let points = self.embed_off_thread(chunks.to_vec()).await?;
        let dim = points.first().map_or(0, |p| p.vector.len());
        let ids: Vec<u64> = points.iter().map(|p| p.id).collect();
        let lexical_entries: Vec<_> = points.iter().map(|p| (p.content.clone(), p.metadata.clone())).collect();

        ensure_collection(&self.backend, name, dim).await?;
        let points = dedup_points(points);
        self.backend.upsert(name, &points).await.map_err(IngestionError::from)?;

        // Both guards held together so stats never see half a batch.
        let mut lexical = self.lexical.write().await;
        let mut ledger = self.ledger.lock().await;
        lexical.append(lexical_entries.iter().cloned());
        let corpus = lexical.len();
        let record = ledger.record(&ids, lexical_entries.iter().map(|(_, m)| m));
        debug!(batch = record.batch, points = points.len(), corpus, elapsed_ms = start.elapsed().as_millis() as u64, "batch ingested");
        Ok(())
    }

    /// Rank-damped fusion of vector and BM25 results, best first, at most `top_k`.
    #[instrument(skip(self), fields(collection = %self.settings.collection_name))]
    pub async fn hybrid_search(&self, query: &str, top_k: usize, weights: FusionWeights) -> Result<Vec<HybridHit>> {
        if query.trim().is_empty() {
            return Err(Error::Validation("query must not be empty".into()));
        }
        if top_k == 0 {
            return Err(Error::Validation("top_k must be >= 1".into()));
        }
        weights.validate()?;
        let start = Instant::now();
        let pool = top_k.saturating_mul(self.settings.candidate_multiplier);

        // Held for the whole query so a concurrent clear is never half-observed.
        let lexical = self.lexical.read().await;
        let lexical_search = async {
            match lexical.search(query, pool) {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(error = %e, "lexical search degraded");
                    Vec::<LexicalHit>::new()
                }
            }
        };
        let (vector_hits, lexical_hits) = tokio::join!(self.vector_candidates(query, pool), lexical_search);

        let hits = fusion::fuse(&vector_hits, &lexical_hits, weights, top_k);
        debug!(
            vector = vector_hits.len(),
            lexical = lexical_hits.len(),
            returned = hits.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "hybrid search"
        );
        Ok(hits)
    }

    /// Model inference is CPU bound; keep it off the async workers.
    async fn embed_off_thread(&self, chunks: Vec<Chunk>) -> std::result::Result<Vec<IndexedPoint>, IngestionError> {
        let embedder = Arc::clone(&self.embedder);
        tokio::task::spawn_blocking(move || embed_chunks(embedder.as_ref(), &chunks))
            .await
            .map_err(|e| IngestionError::Embedding(format!("embedding task failed: {e}")))?
    }

    async fn vector_candidates(&self, query: &str, pool: usize) -> Vec<ScoredPoint> {
        let embedder = Arc::clone(&self.embedder);
        let text = query.to_owned();
        let vector = match tokio::task::spawn_blocking(move || embed_or_fallback(embedder.as_ref(), &text)).await {
            Ok(Ok((v, _))) => v,
            Ok(Err(e)) => {
                warn!(error = %e, "query embedding failed; vector results skipped");
                return Vec::new();
            }
            Err(e) => {
                warn!(error = %e, "query embedding task failed; vector results skipped");
                return Vec::new();
            }
        };
        match self.backend.search(&self.settings.collection_name, &vector, pool).await {
            Ok(hits) => hits,
            Err(BackendError::NotFound(_)) => {
                debug!("collection not created yet");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "vector search degraded");
                Vec::new()
            }
        }
    }

    /// Hybrid search over `2 * top_k` candidates keeping those of `doc_type`.
    pub async fn search_by_type(&self, query: &str, doc_type: &str, top_k: usize) -> Result<Vec<HybridHit>> {
        let mut hits = self.hybrid_search(query, top_k.saturating_mul(2), self.default_weights()).await?;
        filter::retain_doc_types(&mut hits, &[doc_type]);
        hits.truncate(top_k);
        Ok(hits)
    }

    /// Hybrid search over `3 * top_k` candidates keeping those tagged with any of `tags`.
    pub async fn search_by_tags<S: AsRef<str>>(&self, query: &str, tags: &[S], top_k: usize) -> Result<Vec<HybridHit>> {
        let mut hits = self.hybrid_search(query, top_k.saturating_mul(3), self.default_weights()).await?;
        filter::retain_any_tag(&mut hits, tags);
        hits.truncate(top_k);
        Ok(hits)
    }

    /// Hybrid search over `3 * top_k` candidates narrowed to the intent's
    /// document types, then to its tags.
    pub async fn search_with_intent(&self, query: &str, intent: QueryIntent, top_k: usize) -> Result<Vec<HybridHit>> {
        let mut hits = self.hybrid_search(query, top_k.saturating_mul(3), self.default_weights()).await?;
        filter::retain_doc_types(&mut hits, intent.doc_types());
        filter::retain_any_tag(&mut hits, intent.tags());
        hits.truncate(top_k);
        debug!(%intent, returned = hits.len(), "intent search");
        Ok(hits)
    }

    /// Stored points whose metadata satisfies `filter`, from the first `limit`
    /// points in storage order. Scores are `0`.
    pub async fn search_by_metadata(&self, filter: &MetadataFilter, limit: Option<usize>) -> Result<Vec<HybridHit>> {
        if filter.is_empty() {
            return Ok(Vec::new());
        }
        let limit = limit.unwrap_or(DEFAULT_SCROLL_LIMIT);
        let points = match self.backend.scroll(&self.settings.collection_name, limit).await {
            Ok(points) => points,
            Err(BackendError::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(points
            .into_iter()
            .filter(|p| filter.matches(&p.metadata))
            .map(|p| HybridHit { content: p.content, metadata: p.metadata, vector_score: 0.0, bm25_score: 0.0, combined_score: 0.0 })
            .collect())
    }

    /// Drop the vector collection and reset the lexical index and ledger.
    #[instrument(skip(self), fields(collection = %self.settings.collection_name))]
    pub async fn clear(&self) -> Result<()> {
        let _gate = self.write_gate.lock().await;
        let mut lexical = self.lexical.write().await;
        drop_collection(&self.backend, &self.settings.collection_name).await?;
        lexical.clear();
        self.ledger.lock().await.clear();
        info!("engine cleared");
        Ok(())
    }

    pub async fn stats(&self) -> EngineStats {
        let lexical_documents = self.lexical.read().await.len();
        self.ledger.lock().await.stats(lexical_documents)
    }

    /// Write the ingestion ledger and current stats to `path` as JSON.
    pub async fn save_state(&self, path: &Path) -> Result<()> {
        let stats = self.stats().await;
        self.ledger.lock().await.save(path, &stats)?;
        info!(path = %path.display(), "state saved");
        Ok(())
    }
}
