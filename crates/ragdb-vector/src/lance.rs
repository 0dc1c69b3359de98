use arrow_array::RecordBatchIterator;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use std::path::Path;
use tracing::{debug, info, instrument};

use ragdb_core::error::BackendError;
use ragdb_core::traits::VectorBackend;
use ragdb_core::types::{CollectionInfo, Distance, IndexedPoint, ScoredPoint};

use crate::schema::{batch_to_points, collection_schema, points_to_batch, vector_dim, ID_COL};
use crate::table::{backend_error, open_dir, table_exists};

/// Embedded LanceDB store; one table per collection.
pub struct LanceBackend { conn: Connection }

impl LanceBackend {
	pub fn new(conn: Connection) -> Self { Self { conn } }

	pub async fn open(path: &Path) -> Result<Self, BackendError> {
		info!(path = %path.display(), "opening lancedb vector store");
		Ok(Self::new(open_dir(path).await?))
	}

	async fn table(&self, name: &str) -> Result<Table, BackendError> {
		self.conn.open_table(name).execute().await.map_err(|e| backend_error(name, e))
	}

	async fn dim_of(&self, name: &str, table: &Table) -> Result<usize, BackendError> {
		let schema = table.schema().await.map_err(|e| backend_error(name, e))?;
		vector_dim(&schema).ok_or_else(|| BackendError::Unavailable(format!("collection {name} has no vector column")))
	}
}

impl VectorBackend for LanceBackend {
	async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>, BackendError> {
		if !table_exists(&self.conn, name).await? { return Ok(None); }
		let table = match self.table(name).await {
			Ok(t) => t,
			Err(BackendError::NotFound(_)) => return Ok(None),
			Err(e) => return Err(e),
		};
		let dim = self.dim_of(name, &table).await?;
		let points = table.count_rows(None).await.map_err(|e| backend_error(name, e))?;
		Ok(Some(CollectionInfo { dim, points }))
	}

	#[instrument(skip(self))]
	async fn create_collection(&self, name: &str, dim: usize, distance: Distance) -> Result<(), BackendError> {
		// Cosine is the only metric; it is applied per query.
		let Distance::Cosine = distance;
		self.conn.create_empty_table(name, collection_schema(dim)).execute().await.map_err(|e| backend_error(name, e))?;
		info!(collection = name, dim, "collection created");
		Ok(())
	}

	#[instrument(skip(self, points), fields(points = points.len()))]
	async fn upsert(&self, name: &str, points: &[IndexedPoint]) -> Result<(), BackendError> {
		if points.is_empty() { return Ok(()); }
		let table = self.table(name).await?;
		let dim = self.dim_of(name, &table).await?;
		if let Some(bad) = points.iter().find(|p| p.vector.len() != dim) {
			return Err(BackendError::DimensionMismatch { expected: dim, actual: bad.vector.len() });
		}
		let batch = points_to_batch(points, dim).map_err(|e| BackendError::Unavailable(e.to_string()))?;
		let schema = batch.schema();
		let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
		// Upsert behavior via merge_insert: id is unique
		let mut mi = table.merge_insert(&[ID_COL]);
		mi.when_matched_update_all(None).when_not_matched_insert_all();
		mi.execute(reader).await.map_err(|e| backend_error(name, e))?;
		debug!(collection = name, "points upserted");
		Ok(())
	}

	async fn search(&self, name: &str, vector: &[f32], k: usize) -> Result<Vec<ScoredPoint>, BackendError> {
		let table = self.table(name).await?;
		let dim = self.dim_of(name, &table).await?;
		if vector.len() != dim { return Err(BackendError::DimensionMismatch { expected: dim, actual: vector.len() }); }
		if k == 0 || table.count_rows(None).await.map_err(|e| backend_error(name, e))? == 0 { return Ok(Vec::new()); }

		let mut stream = table
			.vector_search(vector.to_vec())
			.map_err(|e| backend_error(name, e))?
			.distance_type(DistanceType::Cosine)
			.limit(k)
			.execute()
			.await
			.map_err(|e| backend_error(name, e))?;
		let mut hits = Vec::new();
		while let Some(batch) = stream.try_next().await.map_err(|e| backend_error(name, e))? {
			hits.extend(batch_to_points(&batch)?);
		}
		hits.sort_by(|a, b| b.score.total_cmp(&a.score));
		hits.truncate(k);
		Ok(hits)
	}

	async fn scroll(&self, name: &str, limit: usize) -> Result<Vec<ScoredPoint>, BackendError> {
		let table = self.table(name).await?;
		if limit == 0 { return Ok(Vec::new()); }
		let mut stream = table.query().limit(limit).execute().await.map_err(|e| backend_error(name, e))?;
		let mut points = Vec::new();
		while let Some(batch) = stream.try_next().await.map_err(|e| backend_error(name, e))? {
			points.extend(batch_to_points(&batch)?);
		}
		points.truncate(limit);
		Ok(points)
	}

	#[instrument(skip(self))]
	async fn delete_collection(&self, name: &str) -> Result<(), BackendError> {
		if !table_exists(&self.conn, name).await? { return Err(BackendError::NotFound(name.to_string())); }
		self.conn.drop_table(name, &[]).await.map_err(|e| backend_error(name, e))?;
		info!(collection = name, "collection dropped");
		Ok(())
	}
}
