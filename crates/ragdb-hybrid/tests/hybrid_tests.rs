use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ragdb_core::config::EngineSettings;
use ragdb_core::error::{BackendError, Error, IngestionError};
use ragdb_core::error::EmbedError;
use ragdb_core::traits::{Embedder, VectorBackend};
use ragdb_core::types::{Chunk, CollectionInfo, Distance, IndexedPoint, MetaValue, ScoredPoint};
use ragdb_embed::{FakeEmbedder, UnavailableEmbedder};
use ragdb_hybrid::{FusionWeights, HybridEngine, MetadataFilter, QueryIntent};
use ragdb_vector::MemoryBackend;

const CRISPR: &str = "CRISPR gene editing trial results";
const BUDGET: &str = "Quarterly budget meeting notes";

fn engine() -> HybridEngine<MemoryBackend> {
    HybridEngine::new(MemoryBackend::new(), Box::new(FakeEmbedder::new(64)), EngineSettings::default()).expect("engine")
}

fn offline_engine() -> HybridEngine<MemoryBackend> {
    HybridEngine::new(MemoryBackend::new(), Box::new(UnavailableEmbedder::new("offline")), EngineSettings::default()).expect("engine")
}

fn chunks(texts: &[&str]) -> Vec<Chunk> {
    texts.iter().map(|t| Chunk::new(*t)).collect()
}

/// Forwards to a memory backend; can fail upserts or searches and fake a lost creation race.
#[derive(Default)]
struct ScriptedBackend {
    inner: MemoryBackend,
    fail_upsert: AtomicBool,
    fail_search: AtomicBool,
    race_on_create: AtomicBool,
}

impl VectorBackend for ScriptedBackend {
    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>, BackendError> {
        self.inner.collection_info(name).await
    }

    async fn create_collection(&self, name: &str, dim: usize, distance: Distance) -> Result<(), BackendError> {
        if self.race_on_create.swap(false, Ordering::SeqCst) {
            self.inner.create_collection(name, dim, distance).await?;
            return Err(BackendError::Conflict(name.to_string()));
        }
        self.inner.create_collection(name, dim, distance).await
    }

    async fn upsert(&self, name: &str, points: &[IndexedPoint]) -> Result<(), BackendError> {
        if self.fail_upsert.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("connection refused".into()));
        }
        self.inner.upsert(name, points).await
    }

    async fn search(&self, name: &str, vector: &[f32], k: usize) -> Result<Vec<ScoredPoint>, BackendError> {
        if self.fail_search.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("connection reset".into()));
        }
        self.inner.search(name, vector, k).await
    }

    async fn scroll(&self, name: &str, limit: usize) -> Result<Vec<ScoredPoint>, BackendError> {
        self.inner.scroll(name, limit).await
    }

    async fn delete_collection(&self, name: &str) -> Result<(), BackendError> {
        self.inner.delete_collection(name).await
    }
}

#[tokio::test]
async fn crispr_scenario_ranks_the_matching_chunk_first() {
    for engine in [engine(), offline_engine()] {
        engine.add_documents(&chunks(&[CRISPR, BUDGET])).await.expect("ingest");
        let hits = engine.hybrid_search("CRISPR editing", 5, FusionWeights::default()).await.expect("search");
        assert_eq!(hits[0].content, CRISPR);
        assert!(hits[0].bm25_score > 0.0);
        for h in &hits {
            assert!((h.combined_score - (h.vector_score + h.bm25_score)).abs() < 1e-6);
        }
    }
}

#[tokio::test]
async fn ingested_token_is_found_lexically() {
    let engine = engine();
    engine.add_documents(&chunks(&["amyloid-beta plaque reduction observed", BUDGET])).await.expect("ingest");
    let hits = engine.hybrid_search("plaque", 1, FusionWeights::default()).await.expect("search");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].content, "amyloid-beta plaque reduction observed");
    assert!(hits[0].bm25_score > 0.0);
}

#[tokio::test]
async fn empty_engine_returns_nothing() {
    let engine = engine();
    for k in [1, 5, 50] {
        assert!(engine.hybrid_search("anything", k, FusionWeights::default()).await.expect("search").is_empty());
    }
    assert!(engine.search_by_metadata(&MetadataFilter::new().with("doc_type", "general"), None).await.expect("scroll").is_empty());
}

#[tokio::test]
async fn invalid_requests_are_rejected_before_io() {
    let engine = engine();
    assert!(matches!(engine.hybrid_search("   ", 5, FusionWeights::default()).await, Err(Error::Validation(_))));
    assert!(matches!(engine.hybrid_search("gene", 0, FusionWeights::default()).await, Err(Error::Validation(_))));
    assert!(matches!(engine.hybrid_search("gene", 5, FusionWeights::new(-1.0, 0.5)).await, Err(Error::Validation(_))));
    assert!(matches!(engine.add_documents(&[]).await, Err(Error::Validation(_))));
    assert!(matches!(engine.add_documents(&chunks(&["ok", ""])).await, Err(Error::Validation(_))));
    assert_eq!(engine.stats().await.lexical_documents, 0);
}

#[tokio::test]
async fn lexical_only_weights_zero_the_vector_side() {
    let engine = engine();
    engine.add_documents(&chunks(&[CRISPR, BUDGET, "gene expression atlas"])).await.expect("ingest");
    let hits = engine.hybrid_search("gene", 5, FusionWeights::new(0.0, 1.0)).await.expect("search");
    assert!(!hits.is_empty());
    for h in &hits {
        assert_eq!(h.vector_score, 0.0);
        assert_eq!(h.combined_score, h.bm25_score);
    }
}

#[tokio::test]
async fn reingestion_overwrites_points_but_grows_the_corpus() {
    let engine = engine();
    engine.add_documents(&chunks(&[CRISPR])).await.expect("ingest");
    engine.add_documents(&chunks(&[CRISPR])).await.expect("ingest again");

    let info = engine.backend().collection_info("documents").await.expect("info").expect("collection");
    assert_eq!(info.points, 1);
    let stats = engine.stats().await;
    assert_eq!(stats.lexical_documents, 2);
    assert_eq!(stats.unique_points, 1);
    assert_eq!(stats.batches, 2);

    // Duplicate corpus entries still surface once.
    let hits = engine.hybrid_search("CRISPR", 5, FusionWeights::default()).await.expect("search");
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn repeated_queries_are_identical() {
    let engine = engine();
    engine.add_documents(&chunks(&[CRISPR, BUDGET, "gene therapy trial", "trial budget review"])).await.expect("ingest");
    let a = engine.hybrid_search("trial gene", 3, FusionWeights::default()).await.expect("search");
    let b = engine.hybrid_search("trial gene", 3, FusionWeights::default()).await.expect("search");
    assert_eq!(a, b);
    assert!(a.windows(2).all(|w| w[0].combined_score >= w[1].combined_score));
}

#[tokio::test]
async fn failed_upsert_leaves_the_lexical_index_untouched() {
    let backend = ScriptedBackend::default();
    backend.fail_upsert.store(true, Ordering::SeqCst);
    let engine = HybridEngine::new(backend, Box::new(FakeEmbedder::new(16)), EngineSettings::default()).expect("engine");

    let err = engine.add_documents(&chunks(&[CRISPR])).await.unwrap_err();
    assert!(matches!(err, Error::Ingestion(IngestionError::BackendUnavailable(_))));
    let stats = engine.stats().await;
    assert_eq!(stats.lexical_documents, 0);
    assert_eq!(stats.batches, 0);
    assert!(engine.hybrid_search("CRISPR", 5, FusionWeights::default()).await.expect("search").is_empty());

    engine.backend().fail_upsert.store(false, Ordering::SeqCst);
    engine.add_documents(&chunks(&[CRISPR])).await.expect("retry");
    assert_eq!(engine.stats().await.lexical_documents, 1);
}

#[tokio::test]
async fn lost_creation_race_counts_as_success() {
    let backend = ScriptedBackend::default();
    backend.race_on_create.store(true, Ordering::SeqCst);
    let engine = HybridEngine::new(backend, Box::new(FakeEmbedder::new(16)), EngineSettings::default()).expect("engine");
    engine.add_documents(&chunks(&[CRISPR])).await.expect("ingest");
    assert_eq!(engine.hybrid_search("CRISPR", 1, FusionWeights::default()).await.expect("search")[0].content, CRISPR);
}

#[tokio::test]
async fn collection_dimension_is_fixed() {
    let engine = engine();
    engine.backend().create_collection("documents", 3, Distance::Cosine).await.expect("create");
    let err = engine.add_documents(&chunks(&[CRISPR])).await.unwrap_err();
    assert!(matches!(err, Error::Ingestion(IngestionError::DimensionMismatch { expected: 3, actual: 64 })));
    assert_eq!(engine.stats().await.lexical_documents, 0);
}

#[tokio::test]
async fn clear_resets_everything_and_tolerates_missing_collection() {
    let engine = engine();
    engine.clear().await.expect("clear on empty engine");
    engine.add_documents(&chunks(&[CRISPR, BUDGET])).await.expect("ingest");
    engine.clear().await.expect("clear");

    assert!(engine.backend().collection_info("documents").await.expect("info").is_none());
    assert_eq!(engine.stats().await, Default::default());
    assert!(engine.hybrid_search("CRISPR", 5, FusionWeights::default()).await.expect("search").is_empty());

    // A fresh collection may take a new dimension after clear.
    engine.add_documents(&chunks(&[BUDGET])).await.expect("ingest after clear");
    assert_eq!(engine.stats().await.lexical_documents, 1);
}

#[tokio::test]
async fn concurrent_batches_are_serialized() {
    let engine = Arc::new(engine());
    let tasks: Vec<_> = (0..4)
        .map(|i| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                let batch = vec![Chunk::new(format!("batch {i} gene trial")), Chunk::new(format!("batch {i} budget notes"))];
                engine.add_documents(&batch).await
            })
        })
        .collect();
    for t in tasks {
        t.await.expect("join").expect("ingest");
    }
    let stats = engine.stats().await;
    assert_eq!(stats.lexical_documents, 8);
    assert_eq!(stats.unique_points, 8);
    let hits = engine.hybrid_search("gene", 8, FusionWeights::new(0.0, 1.0)).await.expect("search");
    assert_eq!(hits.iter().filter(|h| h.bm25_score > 0.0).count(), 4);
}

#[tokio::test]
async fn vector_outage_degrades_to_lexical_hits() {
    let engine = HybridEngine::new(ScriptedBackend::default(), Box::new(FakeEmbedder::new(16)), EngineSettings::default()).expect("engine");
    engine.add_documents(&chunks(&[CRISPR, BUDGET])).await.expect("ingest");
    engine.backend().fail_search.store(true, Ordering::SeqCst);

    let hits = engine.hybrid_search("CRISPR trial", 5, FusionWeights::default()).await.expect("search");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].content, CRISPR);
    assert_eq!(hits[0].vector_score, 0.0);
    assert!(hits[0].bm25_score > 0.0);
}

#[tokio::test]
async fn stopword_corpus_degrades_to_vector_hits() {
    let engine = engine();
    engine.add_documents(&chunks(&["the and of", "to be or not"])).await.expect("ingest");
    let hits = engine.hybrid_search("the and of", 5, FusionWeights::default()).await.expect("search");
    assert!(!hits.is_empty());
    assert_eq!(hits[0].content, "the and of");
    assert!(hits.iter().all(|h| h.bm25_score == 0.0));
    assert!(hits[0].vector_score > 0.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn clear_is_never_half_observed_by_searches() {
    let engine = Arc::new(engine());
    engine.add_documents(&chunks(&[CRISPR, BUDGET])).await.expect("ingest");

    let searches: Vec<_> = (0..16)
        .map(|_| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.hybrid_search("CRISPR gene", 5, FusionWeights::default()).await })
        })
        .collect();
    let clearing = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.clear().await })
    };

    for task in searches {
        let hits = task.await.expect("join").expect("search");
        for h in hits.iter().filter(|h| h.content == CRISPR) {
            assert_eq!(h.vector_score > 0.0, h.bm25_score > 0.0, "mixed pre/post clear view: {h:?}");
        }
    }
    clearing.await.expect("join").expect("clear");
    assert!(engine.hybrid_search("CRISPR", 5, FusionWeights::default()).await.expect("search").is_empty());
}

/// Blocks its thread the way model inference does.
struct SlowEmbedder(FakeEmbedder);

impl Embedder for SlowEmbedder {
    fn id(&self) -> &str { "slow" }
    fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        std::thread::sleep(Duration::from_millis(100));
        self.0.embed_text(text)
    }
}

#[tokio::test]
async fn embedding_does_not_stall_the_runtime() {
    let engine = HybridEngine::new(MemoryBackend::new(), Box::new(SlowEmbedder(FakeEmbedder::new(16))), EngineSettings::default()).expect("engine");
    let ingest = async {
        engine.add_documents(&chunks(&[CRISPR, BUDGET])).await.expect("ingest");
        Instant::now()
    };
    let ticker = async {
        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Instant::now()
    };
    let (ingested_at, ticked_at) = tokio::join!(ingest, ticker);
    assert!(ticked_at < ingested_at);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stats_see_whole_batches_only() {
    let engine = Arc::new(engine());
    let writer = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            for i in 0..8 {
                let batch = vec![Chunk::new(format!("note {i} gene")), Chunk::new(format!("note {i} trial"))];
                engine.add_documents(&batch).await.expect("ingest");
                tokio::task::yield_now().await;
            }
        })
    };
    while !writer.is_finished() {
        let stats = engine.stats().await;
        assert_eq!(stats.lexical_documents, stats.chunks);
        tokio::task::yield_now().await;
    }
    writer.await.expect("join");
    let stats = engine.stats().await;
    assert_eq!((stats.batches, stats.chunks, stats.lexical_documents), (8, 16, 16));
}

fn tagged(content: &str, doc_type: &str, tags: &[&str]) -> Chunk {
    Chunk::new(content).with_meta("doc_type", doc_type).with_meta("semantic_tags", MetaValue::texts(tags.iter().copied()))
}

async fn tagged_engine() -> HybridEngine<MemoryBackend> {
    let engine = engine();
    engine
        .add_documents(&[
            tagged("trial efficacy results for gene therapy", "research_paper", &["results", "efficacy"]),
            tagged("gene therapy trial methodology and protocol", "research_paper", &["methodology"]),
            tagged("gene therapy trial timeline and milestones", "progress_report", &["timeline"]),
            tagged("gene therapy trial regulatory submission", "general", &["regulatory"]),
        ])
        .await
        .expect("ingest");
    engine
}

#[tokio::test]
async fn type_and_tag_filters_narrow_results() {
    let engine = tagged_engine().await;

    let hits = engine.search_by_type("gene therapy trial", "progress_report", 5).await.expect("by type");
    assert_eq!(hits.len(), 1);
    assert!(hits[0].content.contains("timeline"));

    let hits = engine.search_by_tags("gene therapy trial", &["regulatory", "methodology"], 5).await.expect("by tags");
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.content.contains("regulatory") || h.content.contains("methodology")));
}

#[tokio::test]
async fn intent_applies_doc_types_and_tags() {
    let engine = tagged_engine().await;
    let hits = engine.search_with_intent("gene therapy trial", QueryIntent::ResearchFinding, 5).await.expect("intent");
    assert_eq!(hits.len(), 1);
    assert!(hits[0].content.contains("efficacy"));

    let hits = engine.search_with_intent("gene therapy trial", QueryIntent::Regulatory, 5).await.expect("intent");
    assert_eq!(hits.len(), 1);
    assert!(hits[0].content.contains("regulatory"));
}

#[tokio::test]
async fn metadata_search_scans_stored_points() {
    let engine = tagged_engine().await;
    let filter = MetadataFilter::new().with("doc_type", "research_paper");
    assert_eq!(engine.search_by_metadata(&filter, None).await.expect("scan").len(), 2);

    let filter = MetadataFilter::new().with("doc_type", "research_paper").with("semantic_tags", "methodology");
    let hits = engine.search_by_metadata(&filter, None).await.expect("scan");
    assert_eq!(hits.len(), 1);
    assert!(!hits[0].metadata.contains_key("content"));

    assert!(engine.search_by_metadata(&MetadataFilter::new(), None).await.expect("scan").is_empty());
    assert!(engine.search_by_metadata(&filter, Some(1)).await.expect("scan").is_empty());
}

#[tokio::test]
async fn lexical_only_hits_keep_their_metadata() {
    let engine = tagged_engine().await;
    let hits = engine.hybrid_search("milestones", 8, FusionWeights::new(0.0, 1.0)).await.expect("search");
    let hit = hits.iter().find(|h| h.bm25_score > 0.0).expect("lexical hit");
    assert_eq!(hit.metadata["doc_type"].as_str(), Some("progress_report"));
}

#[tokio::test]
async fn save_state_writes_ledger_and_stats() -> anyhow::Result<()> {
    let engine = tagged_engine().await;
    let tmp = tempfile::TempDir::new()?;
    let path = tmp.path().join("state.json");
    engine.save_state(&path).await?;

    let state: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(state["stats"]["chunks"], 4);
    assert_eq!(state["stats"]["chunks_by_doc_type"]["research_paper"], 2);
    assert_eq!(state["batches"].as_array().map(Vec::len), Some(1));
    Ok(())
}
