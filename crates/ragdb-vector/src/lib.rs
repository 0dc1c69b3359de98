//! Vector storage backends.
//!
//! - [`LanceBackend`]: embedded LanceDB tables, one per collection
//! - [`MemoryBackend`]: in-process store for tests and ephemeral use
//!
//! Both implement [`ragdb_core::traits::VectorBackend`] and report cosine
//! similarity as the hit score.

pub mod lance;
pub mod memory;
pub mod schema;
pub mod table;

pub use lance::LanceBackend;
pub use memory::{cosine_similarity, MemoryBackend};
