//! ragdb-text
//!
//! In-memory BM25 lexical index. Tokenization runs through a tantivy
//! analysis chain (see `tokenize`); scoring and corpus statistics live in
//! `index`.

pub mod index;
pub mod tokenize;

pub use index::{LexicalDocument, LexicalHit, LexicalIndex};
pub use tokenize::TextTokenizer;
