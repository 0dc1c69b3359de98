//! Record of successful ingestion batches.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use ragdb_core::error::Result;
use ragdb_core::types::{ContentId, Metadata};

use crate::filter::DOC_TYPE_KEY;

const UNKNOWN_DOC_TYPE: &str = "unknown";

#[derive(Debug, Clone, Serialize)]
pub struct BatchRecord {
    pub batch: usize,
    pub chunks: usize,
    pub unique_points: usize,
    pub doc_types: BTreeMap<String, usize>,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineStats {
    pub batches: usize,
    pub chunks: usize,
    /// Distinct vector points written since the last clear.
    pub unique_points: usize,
    pub lexical_documents: usize,
    pub chunks_by_doc_type: BTreeMap<String, usize>,
}

#[derive(Serialize)]
struct SavedState<'a> {
    batches: &'a [BatchRecord],
    stats: &'a EngineStats,
    saved_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct IngestionLedger {
    batches: Vec<BatchRecord>,
    points: HashSet<ContentId>,
}

impl IngestionLedger {
    pub fn record<'a, I>(&mut self, ids: &[ContentId], metadata: I) -> &BatchRecord
    where
        I: IntoIterator<Item = &'a Metadata>,
    {
        let mut doc_types = BTreeMap::new();
        for m in metadata {
            let t = m.get(DOC_TYPE_KEY).and_then(|v| v.as_str()).unwrap_or(UNKNOWN_DOC_TYPE);
            *doc_types.entry(t.to_string()).or_insert(0) += 1;
        }
        let distinct: HashSet<ContentId> = ids.iter().copied().collect();
        self.points.extend(distinct.iter().copied());
        self.batches.push(BatchRecord {
            batch: self.batches.len() + 1,
            chunks: ids.len(),
            unique_points: distinct.len(),
            doc_types,
            ingested_at: Utc::now(),
        });
        &self.batches[self.batches.len() - 1]
    }

    pub fn batches(&self) -> &[BatchRecord] {
        &self.batches
    }

    pub fn stats(&self, lexical_documents: usize) -> EngineStats {
        let mut chunks_by_doc_type = BTreeMap::new();
        for b in &self.batches {
            for (t, n) in &b.doc_types {
                *chunks_by_doc_type.entry(t.clone()).or_insert(0) += n;
            }
        }
        EngineStats {
            batches: self.batches.len(),
            chunks: self.batches.iter().map(|b| b.chunks).sum(),
            unique_points: self.points.len(),
            lexical_documents,
            chunks_by_doc_type,
        }
    }

    /// Write batches and stats as pretty JSON.
    pub fn save(&self, path: &Path, stats: &EngineStats) -> Result<()> {
        let state = SavedState { batches: &self.batches, stats, saved_at: Utc::now() };
        let json = serde_json::to_string_pretty(&state)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.batches.clear();
        self.points.clear();
    }
}
