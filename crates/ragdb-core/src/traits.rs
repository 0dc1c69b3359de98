use std::future::Future;

use crate::error::{BackendError, EmbedError};
use crate::types::{CollectionInfo, Distance, IndexedPoint, ScoredPoint};

/// Text → dense vector. Implementations return vectors of a fixed dimension.
pub trait Embedder: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `fake:d384`).
    fn id(&self) -> &str;

    fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        texts.iter().map(|t| self.embed_text(t)).collect()
    }
}

/// Collection-oriented vector store.
///
/// Every call is a single attempt; retries belong to the caller.
pub trait VectorBackend: Send + Sync {
    /// `None` when the collection does not exist.
    fn collection_info(&self, name: &str) -> impl Future<Output = Result<Option<CollectionInfo>, BackendError>> + Send;

    /// Fails with [`BackendError::Conflict`] when the collection already exists.
    fn create_collection(&self, name: &str, dim: usize, distance: Distance) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Insert or overwrite points by id.
    fn upsert(&self, name: &str, points: &[IndexedPoint]) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Up to `k` hits ordered by decreasing similarity.
    fn search(&self, name: &str, vector: &[f32], k: usize) -> impl Future<Output = Result<Vec<ScoredPoint>, BackendError>> + Send;

    /// Up to `limit` stored points in storage order; `score` is `0`.
    fn scroll(&self, name: &str, limit: usize) -> impl Future<Output = Result<Vec<ScoredPoint>, BackendError>> + Send;

    /// Fails with [`BackendError::NotFound`] when the collection does not exist.
    fn delete_collection(&self, name: &str) -> impl Future<Output = Result<(), BackendError>> + Send;
}
