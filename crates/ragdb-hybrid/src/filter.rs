//! Metadata post-filters applied on top of hybrid results.

use std::fmt;
use std::str::FromStr;

use ragdb_core::error::Error;
use ragdb_core::types::{HybridHit, MetaScalar, Metadata};

pub const DOC_TYPE_KEY: &str = "doc_type";
pub const TAGS_KEY: &str = "semantic_tags";

/// Kind of answer the caller is after; narrows results by document type and tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryIntent {
    ResearchFinding,
    Timeline,
    Regulatory,
    Methodology,
}

impl QueryIntent {
    pub fn doc_types(self) -> &'static [&'static str] {
        match self {
            QueryIntent::ResearchFinding | QueryIntent::Methodology => &["research_paper"],
            QueryIntent::Timeline => &["progress_report"],
            QueryIntent::Regulatory => &["general", "progress_report"],
        }
    }

    pub fn tags(self) -> &'static [&'static str] {
        match self {
            QueryIntent::ResearchFinding => &["finding", "key-finding", "result", "results", "efficacy"],
            QueryIntent::Timeline => &["timeline"],
            QueryIntent::Regulatory => &["regulatory"],
            QueryIntent::Methodology => &["methodology", "method"],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QueryIntent::ResearchFinding => "research_finding",
            QueryIntent::Timeline => "timeline",
            QueryIntent::Regulatory => "regulatory",
            QueryIntent::Methodology => "methodology",
        }
    }
}

impl fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryIntent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "research_finding" => Ok(QueryIntent::ResearchFinding),
            "timeline" => Ok(QueryIntent::Timeline),
            "regulatory" => Ok(QueryIntent::Regulatory),
            "methodology" => Ok(QueryIntent::Methodology),
            other => Err(Error::Validation(format!("unknown query intent: {other}"))),
        }
    }
}

pub fn has_doc_type(metadata: &Metadata, allowed: &[&str]) -> bool {
    metadata.get(DOC_TYPE_KEY).and_then(|v| v.as_str()).is_some_and(|t| allowed.contains(&t))
}

pub fn has_any_tag<S: AsRef<str>>(metadata: &Metadata, tags: &[S]) -> bool {
    metadata.get(TAGS_KEY).is_some_and(|v| tags.iter().any(|t| v.contains_text(t.as_ref())))
}

pub fn retain_doc_types(hits: &mut Vec<HybridHit>, allowed: &[&str]) {
    hits.retain(|h| has_doc_type(&h.metadata, allowed));
}

pub fn retain_any_tag<S: AsRef<str>>(hits: &mut Vec<HybridHit>, tags: &[S]) {
    hits.retain(|h| has_any_tag(&h.metadata, tags));
}

/// Conjunction of `key = value` conditions. A list-valued field satisfies a
/// condition when it contains the value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    conditions: Vec<(String, MetaScalar)>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<MetaScalar>) -> Self {
        self.conditions.push((key.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.conditions.iter().all(|(k, v)| metadata.get(k).is_some_and(|m| m.matches(v)))
    }
}
