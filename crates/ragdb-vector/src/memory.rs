use std::collections::HashMap;
use tokio::sync::RwLock;

use ragdb_core::error::BackendError;
use ragdb_core::traits::VectorBackend;
use ragdb_core::types::{CollectionInfo, ContentId, Distance, IndexedPoint, ScoredPoint};

struct Collection {
	dim: usize,
	points: Vec<IndexedPoint>,
	slots: HashMap<ContentId, usize>,
}

/// Process-local backend with exact (brute force) cosine search.
///
/// Overwriting a point keeps its original storage slot, so equal scores are
/// returned in first-insertion order.
#[derive(Default)]
pub struct MemoryBackend {
	collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryBackend {
	pub fn new() -> Self { Self::default() }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
	let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
	let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
	let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
	if na == 0.0 || nb == 0.0 { 0.0 } else { (dot / (na * nb)).clamp(-1.0, 1.0) }
}

fn to_scored(p: &IndexedPoint, score: f32) -> ScoredPoint {
	ScoredPoint { id: p.id, score, content: p.content.clone(), metadata: p.metadata.clone() }
}

impl VectorBackend for MemoryBackend {
	async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>, BackendError> {
		Ok(self.collections.read().await.get(name).map(|c| CollectionInfo { dim: c.dim, points: c.points.len() }))
	}

	async fn create_collection(&self, name: &str, dim: usize, distance: Distance) -> Result<(), BackendError> {
		let Distance::Cosine = distance;
		let mut guard = self.collections.write().await;
		if guard.contains_key(name) { return Err(BackendError::Conflict(name.to_string())); }
		guard.insert(name.to_string(), Collection { dim, points: Vec::new(), slots: HashMap::new() });
		Ok(())
	}

	async fn upsert(&self, name: &str, points: &[IndexedPoint]) -> Result<(), BackendError> {
		let mut guard = self.collections.write().await;
		let coll = guard.get_mut(name).ok_or_else(|| BackendError::NotFound(name.to_string()))?;
		if let Some(bad) = points.iter().find(|p| p.vector.len() != coll.dim) {
			return Err(BackendError::DimensionMismatch { expected: coll.dim, actual: bad.vector.len() });
		}
		for p in points {
			match coll.slots.get(&p.id) {
				Some(&slot) => coll.points[slot] = p.clone(),
				None => {
					coll.slots.insert(p.id, coll.points.len());
					coll.points.push(p.clone());
				}
			}
		}
		Ok(())
	}

	async fn search(&self, name: &str, vector: &[f32], k: usize) -> Result<Vec<ScoredPoint>, BackendError> {
		let guard = self.collections.read().await;
		let coll = guard.get(name).ok_or_else(|| BackendError::NotFound(name.to_string()))?;
		if vector.len() != coll.dim { return Err(BackendError::DimensionMismatch { expected: coll.dim, actual: vector.len() }); }
		let mut hits: Vec<ScoredPoint> = coll.points.iter().map(|p| to_scored(p, cosine_similarity(vector, &p.vector))).collect();
		hits.sort_by(|a, b| b.score.total_cmp(&a.score));
		hits.truncate(k);
		Ok(hits)
	}

	async fn scroll(&self, name: &str, limit: usize) -> Result<Vec<ScoredPoint>, BackendError> {
		let guard = self.collections.read().await;
		let coll = guard.get(name).ok_or_else(|| BackendError::NotFound(name.to_string()))?;
		Ok(coll.points.iter().take(limit).map(|p| to_scored(p, 0.0)).collect())
	}

	async fn delete_collection(&self, name: &str) -> Result<(), BackendError> {
		match self.collections.write().await.remove(name) {
			Some(_) => Ok(()),
			None => Err(BackendError::NotFound(name.to_string())),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cosine_handles_zero_vectors() {
		assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
		assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
		assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
	}
}
