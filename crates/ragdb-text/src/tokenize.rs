use std::collections::HashSet;

use tantivy::tokenizer::{LowerCaser, RegexTokenizer, StopWordFilter, TextAnalyzer, TokenStream};

use ragdb_core::error::{Error, Result};

/// Unicode letter and digit runs (combining marks included); internal hyphens
/// keep compounds such as `amyloid-beta` whole.
pub const TOKEN_PATTERN: &str = r"[\p{L}\p{N}][\p{L}\p{M}\p{N}]*(?:-[\p{L}\p{M}\p{N}]+)*";

pub const STOP_WORDS: &[&str] = &[
	"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
	"i","we","our","you","your","she","her","his","him","been","being","were","into","about","over","under","also","such","each","other","all","any","both","no","nor","only","own","same","too","very","just",
];

/// Text → normalized token sequence, shared by documents and queries.
///
/// Lowercases, drops stop words and single-character tokens, and keeps only
/// the first occurrence of each token.
#[derive(Clone)]
pub struct TextTokenizer {
	analyzer: TextAnalyzer,
}

impl TextTokenizer {
	pub fn new() -> Result<Self> {
		let regex = RegexTokenizer::new(TOKEN_PATTERN)
			.map_err(|e| Error::InvalidConfig(format!("token pattern: {e}")))?;
		let analyzer = TextAnalyzer::builder(regex)
			.filter(LowerCaser)
			.filter(StopWordFilter::remove(STOP_WORDS.iter().map(|s| s.to_string())))
			.build();
		Ok(Self { analyzer })
	}

	pub fn tokenize(&self, text: &str) -> Vec<String> {
		let mut analyzer = self.analyzer.clone();
		let mut stream = analyzer.token_stream(text);
		let mut seen = HashSet::new();
		let mut tokens = Vec::new();
		while stream.advance() {
			let token = &stream.token().text;
			if token.chars().count() < 2 { continue; }
			if seen.insert(token.clone()) { tokens.push(token.clone()); }
		}
		tokens
	}
}
