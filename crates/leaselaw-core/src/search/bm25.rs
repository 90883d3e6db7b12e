//! Candidate-level BM25 scoring
//!
//! Scores a small in-memory candidate list against a query with the
//! classical Okapi formula (or the BM25+ lower-bounded variant). The
//! same math backs the global inverted index so fused channels stay
//! comparable.

use super::{truncate_chars, Document, Tokenizer};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// BM25+ lower bound added to the TF component of matching terms.
const PLUS_DELTA: f64 = 1.0;

/// BM25 variant selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Bm25Algorithm {
    #[default]
    Okapi,
    Plus,
}

/// BM25 scoring parameters.
#[derive(Debug, Clone)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
    pub algorithm: Bm25Algorithm,
    /// Inputs are truncated to this many chars before tokenization.
    pub max_doc_chars: usize,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: 1.8,
            b: 0.85,
            algorithm: Bm25Algorithm::Okapi,
            max_doc_chars: 4000,
        }
    }
}

/// Score candidate document bodies. Returns one score per document.
pub fn score_candidates(
    query: &str,
    docs: &[Document],
    tokenizer: &dyn Tokenizer,
    params: &Bm25Params,
) -> Vec<f64> {
    let texts: Vec<&str> = docs.iter().map(|d| d.content.as_str()).collect();
    score_texts(query, &texts, tokenizer, params)
}

/// Score arbitrary strings (titles, snippets) with the same formula.
pub fn score_texts(
    query: &str,
    texts: &[&str],
    tokenizer: &dyn Tokenizer,
    params: &Bm25Params,
) -> Vec<f64> {
    if texts.is_empty() {
        return Vec::new();
    }
    let query_tokens = tokenizer.tokenize(query);
    let docs_tokens: Vec<Vec<String>> = texts
        .iter()
        .map(|t| tokenizer.tokenize(&truncate_chars(t, params.max_doc_chars)))
        .collect();
    score_token_lists(&query_tokens, &docs_tokens, params)
}

/// Core scorer over pre-tokenized input.
///
/// IDF is `ln(1 + (N - df + 0.5) / (df + 0.5))`; a repeated query term
/// contributes a mild `1 + 0.1·(qf - 1)` boost.
pub fn score_token_lists(
    query_tokens: &[String],
    docs_tokens: &[Vec<String>],
    params: &Bm25Params,
) -> Vec<f64> {
    let n = docs_tokens.len();
    if n == 0 {
        return Vec::new();
    }
    if query_tokens.is_empty() {
        return vec![0.0; n];
    }

    let doc_lens: Vec<usize> = docs_tokens.iter().map(Vec::len).collect();
    let avgdl = (doc_lens.iter().sum::<usize>() as f64 / n as f64).max(1e-9);

    let mut df: HashMap<&str, usize> = HashMap::new();
    for toks in docs_tokens {
        let mut seen: Vec<&str> = toks.iter().map(String::as_str).collect();
        seen.sort_unstable();
        seen.dedup();
        for term in seen {
            *df.entry(term).or_insert(0) += 1;
        }
    }

    let idf: HashMap<&str, f64> = df
        .iter()
        .map(|(term, dfi)| {
            let v = (1.0 + (n as f64 - *dfi as f64 + 0.5) / (*dfi as f64 + 0.5)).ln();
            (*term, v)
        })
        .collect();

    let mut qtf: HashMap<&str, usize> = HashMap::new();
    for t in query_tokens {
        *qtf.entry(t.as_str()).or_insert(0) += 1;
    }

    let mut scores = Vec::with_capacity(n);
    for (toks, dl) in docs_tokens.iter().zip(doc_lens.iter()) {
        let mut tf: HashMap<&str, usize> = HashMap::new();
        for t in toks {
            *tf.entry(t.as_str()).or_insert(0) += 1;
        }
        let norm = (1.0 - params.b) + params.b * (*dl as f64 / avgdl);
        let mut score = 0.0;
        for (term, qf) in &qtf {
            let f = *tf.get(term).unwrap_or(&0) as f64;
            if f <= 0.0 {
                continue;
            }
            let denom = f + params.k1 * norm;
            if denom <= 0.0 {
                continue;
            }
            let mut tf_component = f * (params.k1 + 1.0) / denom;
            if params.algorithm == Bm25Algorithm::Plus {
                tf_component += PLUS_DELTA;
            }
            score += idf.get(term).copied().unwrap_or(0.0)
                * tf_component
                * (1.0 + 0.1 * (*qf as f64 - 1.0));
        }
        scores.push(score);
    }
    scores
}
