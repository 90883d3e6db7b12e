//! Retrieval core module
//!
//! Provides:
//! - Candidate-level and global (inverted index) BM25 scoring
//! - Multi-channel rank fusion (RRF, rank-sum, weighted)
//! - The retrieval orchestrator with case reassembly and priority ordering
//! - Legal-hierarchy context formatting

mod bm25;
mod context;
mod fusion;
mod inverted;
mod pipeline;
mod tokenize;

pub use bm25::{score_candidates, score_texts, Bm25Algorithm, Bm25Params};
pub use context::{format_contract_block, format_context, format_reference_line, format_reference_short};
pub use fusion::{fuse_rank_channels, FusionMode};
pub use inverted::Bm25InvertedIndex;
pub use pipeline::{AnswerTrace, AskOptions, RetrievalPipeline, RetrievalResult};
pub use tokenize::{select_tokenizer, RegexTokenizer, Tokenizer};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Reserved metadata keys attached in-flight by the retrieval core.
///
/// All keys carry the `__` prefix so they never collide with indexed
/// source metadata.
pub mod keys {
    pub const SOURCE_INDEX: &str = "__source_index";
    pub const DENSE_SCORE: &str = "__dense_score";
    pub const DENSE_RANK: &str = "__dense_rank";
    pub const BM25_SCORE: &str = "__bm25_score";
    pub const BM25_RANK: &str = "__bm25_rank";
    pub const BM25_TITLE_SCORE: &str = "__bm25_title_score";
    pub const BM25_TITLE_RANK: &str = "__bm25_title_rank";
    pub const HYBRID_SCORE: &str = "__hybrid_score";
    pub const HYBRID_RANK: &str = "__hybrid_rank";
    pub const EXPANDED: &str = "__expanded";
}

/// Priority assigned to documents whose metadata carries none.
pub const DEFAULT_PRIORITY: i64 = 99;

/// The three source collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceIndex {
    Law,
    Rule,
    Case,
}

impl SourceIndex {
    pub const ALL: [SourceIndex; 3] = [SourceIndex::Law, SourceIndex::Rule, SourceIndex::Case];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceIndex::Law => "law",
            SourceIndex::Rule => "rule",
            SourceIndex::Case => "case",
        }
    }
}

impl fmt::Display for SourceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The atomic retrievable unit.
///
/// `metadata` is an open string-to-JSON mapping; recognized fields
/// (`chunk_id`, `src_title`, `article`, `case_no`, `priority`, ...) are
/// read leniently since the indexed corpus mixes value types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(content: impl Into<String>, metadata: HashMap<String, Value>) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }

    /// Set a metadata field.
    pub fn annotate(&mut self, key: &str, value: impl Into<Value>) {
        self.metadata.insert(key.to_string(), value.into());
    }

    /// Read a metadata field as text. Scalars are stringified; empty
    /// strings, nulls and composites yield `None`.
    pub fn meta_str(&self, key: &str) -> Option<String> {
        match self.metadata.get(key)? {
            Value::String(s) => {
                let t = s.trim();
                if t.is_empty() {
                    None
                } else {
                    Some(t.to_string())
                }
            }
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Read a metadata field as an integer, coercing numeric strings.
    pub fn meta_i64(&self, key: &str) -> Option<i64> {
        match self.metadata.get(key)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Read a metadata field as a float.
    pub fn meta_f64(&self, key: &str) -> Option<f64> {
        match self.metadata.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// True when the flag key is present and truthy.
    pub fn meta_flag(&self, key: &str) -> bool {
        matches!(self.metadata.get(key), Some(Value::Bool(true)))
    }

    /// Legal weight of this document. Missing or malformed values
    /// coerce to [`DEFAULT_PRIORITY`].
    pub fn priority(&self) -> i64 {
        self.meta_i64("priority").unwrap_or(DEFAULT_PRIORITY)
    }

    /// Source collection this document was fetched from, if annotated.
    pub fn source_index(&self) -> Option<SourceIndex> {
        match self.meta_str(keys::SOURCE_INDEX)?.as_str() {
            "law" => Some(SourceIndex::Law),
            "rule" => Some(SourceIndex::Rule),
            "case" => Some(SourceIndex::Case),
            _ => None,
        }
    }
}

/// Identity of a document for dedup purposes: the first non-empty
/// configured key field, else a content hash.
pub fn dedupe_key(doc: &Document, key_fields: &[String]) -> String {
    for field in key_fields {
        if let Some(v) = doc.meta_str(field) {
            return format!("{field}:{v}");
        }
    }
    let mut hasher = Sha256::new();
    hasher.update(doc.content.as_bytes());
    format!("content:{:x}", hasher.finalize())
}

/// Remove duplicate documents, keeping the first occurrence.
pub fn dedupe_documents(docs: Vec<Document>, key_fields: &[String]) -> Vec<Document> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(docs.len());
    for doc in docs {
        if seen.insert(dedupe_key(&doc, key_fields)) {
            out.push(doc);
        }
    }
    out
}

/// Truncate to at most `max_chars` characters, ellipsis included.
/// Counts chars, not bytes, since most of the corpus is Hangul.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.is_empty() || max_chars == 0 {
        return String::new();
    }
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}
