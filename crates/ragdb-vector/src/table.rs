//! LanceDB connection and housekeeping helpers.

use lancedb::{connect, Connection};
use std::path::Path;
use tracing::debug;

use ragdb_core::error::BackendError;

/// Translate a LanceDB error for collection `name` into the backend taxonomy.
pub fn backend_error(name: &str, err: lancedb::Error) -> BackendError {
	match err {
		lancedb::Error::TableNotFound { .. } => BackendError::NotFound(name.to_string()),
		lancedb::Error::TableAlreadyExists { .. } => BackendError::Conflict(name.to_string()),
		other => BackendError::Unavailable(other.to_string()),
	}
}

pub async fn open_db(uri: &str) -> Result<Connection, BackendError> {
	debug!(uri, "connecting to lancedb");
	connect(uri).execute().await.map_err(|e| BackendError::Unavailable(e.to_string()))
}

/// Open a local database directory, creating it if needed.
pub async fn open_dir(path: &Path) -> Result<Connection, BackendError> {
	std::fs::create_dir_all(path).map_err(|e| BackendError::Unavailable(format!("{}: {e}", path.display())))?;
	open_db(path.to_string_lossy().as_ref()).await
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool, BackendError> {
	let names = conn.table_names().execute().await.map_err(|e| backend_error(name, e))?;
	Ok(names.iter().any(|n| n == name))
}
