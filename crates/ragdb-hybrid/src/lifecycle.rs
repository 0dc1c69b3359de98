//! Collection creation and removal.

use tracing::{debug, info, warn};

use ragdb_core::error::{BackendError, IngestionError};
use ragdb_core::traits::VectorBackend;
use ragdb_core::types::Distance;

/// Make sure `name` exists with vectors of width `dim`.
///
/// Creation is deferred to the first write since the width is only known once
/// something has been embedded. Losing a creation race counts as success as
/// long as the winner used the same width.
pub async fn ensure_collection<B: VectorBackend>(backend: &B, name: &str, dim: usize) -> Result<(), IngestionError> {
    if let Some(info) = backend.collection_info(name).await? {
        return check_dim(info.dim, dim);
    }
    match backend.create_collection(name, dim, Distance::Cosine).await {
        Ok(()) => {
            info!(collection = name, dim, "created vector collection");
            Ok(())
        }
        Err(BackendError::Conflict(_)) => {
            debug!(collection = name, "collection created concurrently");
            match backend.collection_info(name).await? {
                Some(info) => check_dim(info.dim, dim),
                None => Err(IngestionError::BackendUnavailable(format!("collection {name} vanished after creation conflict"))),
            }
        }
        Err(e) => Err(e.into()),
    }
}

fn check_dim(expected: usize, actual: usize) -> Result<(), IngestionError> {
    if expected == actual { Ok(()) } else { Err(IngestionError::DimensionMismatch { expected, actual }) }
}

/// Delete `name`; a missing collection is already cleared.
pub async fn drop_collection<B: VectorBackend>(backend: &B, name: &str) -> Result<(), BackendError> {
    match backend.delete_collection(name).await {
        Ok(()) => {
            info!(collection = name, "deleted vector collection");
            Ok(())
        }
        Err(BackendError::NotFound(_)) => {
            warn!(collection = name, "collection to delete was not found");
            Ok(())
        }
        Err(e) => Err(e),
    }
}
