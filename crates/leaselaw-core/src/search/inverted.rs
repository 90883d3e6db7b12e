//! Global BM25 inverted index
//!
//! Optional per-source sparse path: built once from a corpus snapshot at
//! process start, read-only afterwards. Search accumulates contributions
//! over the postings of query terms only, with the same formula as the
//! candidate-level scorer so fused channels stay comparable.

use super::bm25::{Bm25Algorithm, Bm25Params};
use super::{dedupe_documents, truncate_chars, Document, Tokenizer};
use std::collections::HashMap;
use std::sync::Arc;

const PLUS_DELTA: f64 = 1.0;

pub struct Bm25InvertedIndex {
    tokenizer: Arc<dyn Tokenizer>,
    key_fields: Vec<String>,
    params: Bm25Params,

    docs: Vec<Document>,
    doc_lens: Vec<usize>,
    avgdl: f64,
    /// postings[term] = (doc_idx, term frequency)
    postings: HashMap<String, Vec<(usize, u32)>>,
    idf: HashMap<String, f64>,
    built: bool,
}

impl Bm25InvertedIndex {
    pub fn new(tokenizer: Arc<dyn Tokenizer>, key_fields: Vec<String>, params: Bm25Params) -> Self {
        Self {
            tokenizer,
            key_fields,
            params,
            docs: Vec::new(),
            doc_lens: Vec::new(),
            avgdl: 0.0,
            postings: HashMap::new(),
            idf: HashMap::new(),
            built: false,
        }
    }

    /// Build the index from a corpus snapshot. Rebuilding replaces all
    /// prior state, so repeated builds over the same corpus are
    /// idempotent.
    pub fn build(&mut self, docs: Vec<Document>) {
        let deduped = dedupe_documents(docs, &self.key_fields);

        self.postings.clear();
        self.idf.clear();
        self.doc_lens.clear();

        let mut df: HashMap<String, usize> = HashMap::new();

        for (idx, doc) in deduped.iter().enumerate() {
            let text = truncate_chars(&doc.content, self.params.max_doc_chars);
            let toks = self.tokenizer.tokenize(&text);
            self.doc_lens.push(toks.len());

            let mut tf: HashMap<String, u32> = HashMap::new();
            for t in toks {
                if t.is_empty() {
                    continue;
                }
                *tf.entry(t).or_insert(0) += 1;
            }
            for (term, f) in tf {
                self.postings.entry(term.clone()).or_default().push((idx, f));
                *df.entry(term).or_insert(0) += 1;
            }
        }

        let n = deduped.len();
        self.avgdl = if n > 0 {
            self.doc_lens.iter().sum::<usize>() as f64 / n as f64
        } else {
            0.0
        };

        for (term, dfi) in df {
            let v = (1.0 + (n as f64 - dfi as f64 + 0.5) / (dfi as f64 + 0.5)).ln();
            self.idf.insert(term, v);
        }

        self.docs = deduped;
        self.built = true;
    }

    pub fn is_built(&self) -> bool {
        self.built && !self.docs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Top-k documents by BM25 score, descending. Ties resolve to the
    /// lower document index so results stay deterministic.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<(Document, f64)> {
        if !self.is_built() || top_k == 0 {
            return Vec::new();
        }
        let q_tokens = self.tokenizer.tokenize(query);
        if q_tokens.is_empty() {
            return Vec::new();
        }

        let mut qtf: HashMap<&str, usize> = HashMap::new();
        for t in &q_tokens {
            *qtf.entry(t.as_str()).or_insert(0) += 1;
        }

        let avgdl = if self.avgdl > 0.0 { self.avgdl } else { 1.0 };
        let k1 = self.params.k1;
        let b = self.params.b;

        let mut scores: HashMap<usize, f64> = HashMap::new();
        for (term, qf) in qtf {
            let Some(postings) = self.postings.get(term) else {
                continue;
            };
            let idf = self.idf.get(term).copied().unwrap_or(0.0);
            if idf == 0.0 {
                continue;
            }
            for (doc_idx, f) in postings {
                let dl = self.doc_lens[*doc_idx] as f64;
                let norm = (1.0 - b) + b * (dl / avgdl);
                let f = *f as f64;
                let denom = f + k1 * norm;
                if denom <= 0.0 {
                    continue;
                }
                let mut tf_component = f * (k1 + 1.0) / denom;
                if self.params.algorithm == Bm25Algorithm::Plus {
                    tf_component += PLUS_DELTA;
                }
                *scores.entry(*doc_idx).or_insert(0.0) +=
                    idf * tf_component * (1.0 + 0.1 * (qf as f64 - 1.0));
            }
        }

        if scores.is_empty() {
            return Vec::new();
        }

        let mut ranked: Vec<(usize, f64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        ranked
            .into_iter()
            .take(top_k)
            .map(|(idx, score)| (self.docs[idx].clone(), score))
            .collect()
    }
}
