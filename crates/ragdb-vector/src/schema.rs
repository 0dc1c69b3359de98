use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, Float32Array, RecordBatch, StringArray, UInt64Array};
use arrow_schema::{ArrowError, DataType, Field, Schema};
use std::sync::Arc;

use ragdb_core::error::BackendError;
use ragdb_core::types::{IndexedPoint, Metadata, ScoredPoint};

pub const ID_COL: &str = "id";
pub const CONTENT_COL: &str = "content";
/// Metadata without the content key, as a JSON object.
pub const PAYLOAD_COL: &str = "payload";
pub const VECTOR_COL: &str = "vector";
/// Added by LanceDB to vector search results.
pub const DISTANCE_COL: &str = "_distance";

pub fn collection_schema(dim: usize) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new(ID_COL, DataType::UInt64, false),
		Field::new(CONTENT_COL, DataType::Utf8, false),
		Field::new(PAYLOAD_COL, DataType::Utf8, false),
		Field::new(VECTOR_COL, DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim as i32), true),
	]))
}

/// Vector width recorded in a collection schema.
pub fn vector_dim(schema: &Schema) -> Option<usize> {
	match schema.field_with_name(VECTOR_COL).ok()?.data_type() {
		DataType::FixedSizeList(_, n) => usize::try_from(*n).ok(),
		_ => None,
	}
}

pub fn points_to_batch(points: &[IndexedPoint], dim: usize) -> Result<RecordBatch, ArrowError> {
	let schema = collection_schema(dim);
	let mut ids = Vec::with_capacity(points.len()); let mut contents = Vec::with_capacity(points.len()); let mut payloads = Vec::with_capacity(points.len());
	let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(points.len());
	for p in points {
		ids.push(p.id);
		contents.push(p.content.clone());
		payloads.push(serde_json::to_string(&p.metadata).map_err(|e| ArrowError::ExternalError(Box::new(e)))?);
		vectors.push(Some(p.vector.iter().map(|&x| Some(x)).collect()));
	}
	RecordBatch::try_new(schema, vec![
		Arc::new(UInt64Array::from(ids)),
		Arc::new(StringArray::from(contents)),
		Arc::new(StringArray::from(payloads)),
		Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors.into_iter(), dim as i32)),
	])
}

/// Decode result rows. Similarity is `1 - _distance` when the distance column
/// is present (cosine distance), otherwise `0`.
pub fn batch_to_points(batch: &RecordBatch) -> Result<Vec<ScoredPoint>, BackendError> {
	let ids = batch.column_by_name(ID_COL).and_then(|c| c.as_any().downcast_ref::<UInt64Array>())
		.ok_or_else(|| BackendError::Unavailable("id column missing".into()))?;
	let contents = batch.column_by_name(CONTENT_COL).and_then(|c| c.as_any().downcast_ref::<StringArray>())
		.ok_or_else(|| BackendError::Unavailable("content column missing".into()))?;
	let payloads = batch.column_by_name(PAYLOAD_COL).and_then(|c| c.as_any().downcast_ref::<StringArray>())
		.ok_or_else(|| BackendError::Unavailable("payload column missing".into()))?;
	let distances = batch.column_by_name(DISTANCE_COL).and_then(|c| c.as_any().downcast_ref::<Float32Array>());

	let mut out = Vec::with_capacity(batch.num_rows());
	for i in 0..batch.num_rows() {
		let metadata: Metadata = if payloads.is_null(i) { Metadata::new() } else {
			serde_json::from_str(payloads.value(i)).map_err(|e| BackendError::Unavailable(format!("corrupt payload for id {}: {e}", ids.value(i))))?
		};
		let score = distances.map(|d| 1.0 - d.value(i)).unwrap_or(0.0);
		out.push(ScoredPoint { id: ids.value(i), score, content: contents.value(i).to_string(), metadata });
	}
	Ok(out)
}
