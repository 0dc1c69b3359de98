use std::collections::HashMap;

use tracing::{debug, instrument};

use ragdb_core::config::Bm25Params;
use ragdb_core::error::{Error, Result};
use ragdb_core::types::Metadata;

use crate::tokenize::TextTokenizer;

/// One stored text plus its derived tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalDocument {
	pub raw_text: String,
	pub tokens: Vec<String>,
	pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LexicalHit {
	/// Insertion position in the corpus.
	pub position: usize,
	pub text: String,
	pub metadata: Metadata,
	pub score: f32,
}

/// In-memory BM25 corpus.
///
/// Append-only from the outside; every append re-tokenizes the whole corpus
/// and recomputes document frequencies and the average length. Callers that
/// share an index across tasks must hold an exclusive lock around `append`.
pub struct LexicalIndex {
	tokenizer: TextTokenizer,
	params: Bm25Params,
	docs: Vec<LexicalDocument>,
	doc_freq: HashMap<String, usize>,
	avg_doc_len: f32,
}

impl LexicalIndex {
	pub fn new(params: Bm25Params) -> Result<Self> {
		Ok(Self { tokenizer: TextTokenizer::new()?, params, docs: Vec::new(), doc_freq: HashMap::new(), avg_doc_len: 0.0 })
	}

	pub fn len(&self) -> usize { self.docs.len() }

	pub fn is_empty(&self) -> bool { self.docs.is_empty() }

	pub fn documents(&self) -> &[LexicalDocument] { &self.docs }

	pub fn tokenizer(&self) -> &TextTokenizer { &self.tokenizer }

	/// Append texts (duplicates included) and rebuild statistics.
	#[instrument(skip_all)]
	pub fn append<I>(&mut self, entries: I)
	where
		I: IntoIterator<Item = (String, Metadata)>,
	{
		let before = self.docs.len();
		self.docs.extend(entries.into_iter().map(|(raw_text, metadata)| LexicalDocument { raw_text, tokens: Vec::new(), metadata }));
		self.rebuild();
		debug!(added = self.docs.len() - before, corpus = self.docs.len(), avg_doc_len = self.avg_doc_len, "lexical index rebuilt");
	}

	pub fn clear(&mut self) {
		self.docs.clear();
		self.doc_freq.clear();
		self.avg_doc_len = 0.0;
	}

	fn rebuild(&mut self) {
		let mut doc_freq: HashMap<String, usize> = HashMap::new();
		let mut total_len = 0usize;
		for doc in self.docs.iter_mut() {
			doc.tokens = self.tokenizer.tokenize(&doc.raw_text);
			total_len += doc.tokens.len();
			for token in &doc.tokens { *doc_freq.entry(token.clone()).or_insert(0) += 1; }
		}
		self.doc_freq = doc_freq;
		self.avg_doc_len = if self.docs.is_empty() { 0.0 } else { total_len as f32 / self.docs.len() as f32 };
	}

	pub fn doc_freq(&self, term: &str) -> usize { self.doc_freq.get(term).copied().unwrap_or(0) }

	pub fn avg_doc_len(&self) -> f32 { self.avg_doc_len }

	/// `ln(1 + (N - df + 0.5) / (df + 0.5))`; always positive.
	pub fn idf(&self, term: &str) -> f32 {
		let n = self.docs.len() as f32;
		let df = self.doc_freq(term) as f32;
		(1.0 + (n - df + 0.5) / (df + 0.5)).ln()
	}

	/// BM25 of one stored document. Term frequency is 0 or 1 because
	/// document tokens are deduplicated.
	pub fn score(&self, doc: &LexicalDocument, query_tokens: &[String]) -> f32 {
		let Bm25Params { k1, b } = self.params;
		let len_norm = 1.0 - b + b * doc.tokens.len() as f32 / self.avg_doc_len;
		query_tokens
			.iter()
			.filter(|q| doc.tokens.iter().any(|t| t == *q))
			.map(|q| self.idf(q) * (k1 + 1.0) / (1.0 + k1 * len_norm))
			.sum()
	}

	/// Up to `limit` documents with a positive score, best first; equal scores
	/// keep insertion order.
	#[instrument(skip(self), fields(corpus = self.docs.len()))]
	pub fn search(&self, query: &str, limit: usize) -> Result<Vec<LexicalHit>> {
		if self.docs.is_empty() || limit == 0 { return Ok(Vec::new()); }
		if self.avg_doc_len <= 0.0 {
			return Err(Error::IndexDegraded(format!("{} documents but no indexable tokens", self.docs.len())));
		}
		let query_tokens = self.tokenizer.tokenize(query);
		if query_tokens.is_empty() { return Ok(Vec::new()); }

		let mut hits: Vec<LexicalHit> = self
			.docs
			.iter()
			.enumerate()
			.filter_map(|(position, doc)| {
				let score = self.score(doc, &query_tokens);
				(score > 0.0).then(|| LexicalHit { position, text: doc.raw_text.clone(), metadata: doc.metadata.clone(), score })
			})
			.collect();
		// sort_by is stable
		hits.sort_by(|a, b| b.score.total_cmp(&a.score));
		hits.truncate(limit);
		Ok(hits)
	}
}
