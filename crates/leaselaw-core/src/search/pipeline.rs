//! Retrieval orchestrator
//!
//! The request-scoped pipeline: query normalization, tri-source
//! parallel dense retrieval, per-source hybrid fusion, optional
//! reranking, two-stage case reassembly, legal-priority ordering and
//! context assembly, ending in answer generation.

use super::context::{format_context, format_contract_block, format_reference_short};
use super::fusion::{fuse_candidates, fuse_with_global};
use super::inverted::Bm25InvertedIndex;
use super::tokenize::Tokenizer;
use super::{dedupe_documents, keys, truncate_chars, Document, SourceIndex};
use crate::config::{RetrievalConfig, SparseMode};
use crate::error::Result;
use crate::llm::prompts::{
    CASE_CONTEXT_QUERY, GENERATION_FAILED_ANSWER, NO_RESULT_ANSWER, SYSTEM_PROMPT_CONTRACT,
    SYSTEM_PROMPT_GENERAL,
};
use crate::llm::{ChatClient, ChatMessage, QueryNormalizer, Reranker};
use crate::vector::DenseIndex;
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-request options for [`RetrievalPipeline::answer_with_trace`].
#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    /// Use the input text as-is instead of normalizing it.
    pub skip_normalization: bool,
    /// Uploaded contract OCR text, rendered as SECTION 0.
    pub extra_context: Option<String>,
    /// Select the contract-analysis system prompt.
    pub use_contract_mode: bool,
}

/// Full trace of one answered request.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AnswerTrace {
    pub normalized_query: String,
    pub references: Vec<String>,
    pub answer: String,
    pub docs: Vec<Document>,
}

/// Retrieval output without generation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RetrievalResult {
    pub docs: Vec<Document>,
    pub context: String,
    pub references: Vec<String>,
}

/// The hybrid retrieval pipeline. Construct once at startup; every
/// request owns its document list end-to-end, so a shared reference is
/// safe across concurrent requests.
pub struct RetrievalPipeline {
    config: RetrievalConfig,
    law: Arc<dyn DenseIndex>,
    rule: Arc<dyn DenseIndex>,
    case: Arc<dyn DenseIndex>,
    tokenizer: Arc<dyn Tokenizer>,
    generator: Arc<dyn ChatClient>,
    normalizer: Option<QueryNormalizer>,
    reranker: Option<Arc<dyn Reranker>>,
    /// Per-source global BM25 indices; read-only once built.
    sparse: HashMap<SourceIndex, Bm25InvertedIndex>,
    call_timeout: Duration,
}

impl RetrievalPipeline {
    pub fn new(
        config: RetrievalConfig,
        law: Arc<dyn DenseIndex>,
        rule: Arc<dyn DenseIndex>,
        case: Arc<dyn DenseIndex>,
        tokenizer: Arc<dyn Tokenizer>,
        generator: Arc<dyn ChatClient>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            law,
            rule,
            case,
            tokenizer,
            generator,
            normalizer: None,
            reranker: None,
            sparse: HashMap::new(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        })
    }

    pub fn with_normalizer(mut self, client: Arc<dyn ChatClient>) -> Self {
        self.normalizer = Some(QueryNormalizer::new(client));
        self
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Install a global BM25 index for one source from a corpus
    /// snapshot. Call during startup, before the pipeline is shared.
    pub fn build_sparse_index(&mut self, source: SourceIndex, docs: Vec<Document>) {
        let mut index = Bm25InvertedIndex::new(
            Arc::clone(&self.tokenizer),
            self.config.dedupe_key_fields.clone(),
            self.config.bm25_body_params(),
        );
        index.build(docs);
        if index.is_built() {
            tracing::info!("global BM25 index built for {source} ({} docs)", index.len());
            self.sparse.insert(source, index);
        }
    }

    fn index_for(&self, source: SourceIndex) -> &Arc<dyn DenseIndex> {
        match source {
            SourceIndex::Law => &self.law,
            SourceIndex::Rule => &self.rule,
            SourceIndex::Case => &self.case,
        }
    }

    /// Dense candidates for one source, annotated with dense score/rank
    /// and the source tag. Failures and timeouts degrade to an empty
    /// contribution.
    async fn fetch_dense(&self, source: SourceIndex, query: &str) -> Vec<Document> {
        let k = self.config.dense_fetch_k(source);
        let fetched = timeout(self.call_timeout, self.index_for(source).search(query, k)).await;
        let pairs = match fetched {
            Ok(Ok(pairs)) => pairs,
            Ok(Err(e)) => {
                tracing::warn!("dense fetch failed for {source}, continuing without it: {e}");
                return Vec::new();
            }
            Err(_) => {
                tracing::warn!("dense fetch timed out for {source}, continuing without it");
                return Vec::new();
            }
        };

        let mut docs = Vec::with_capacity(pairs.len());
        for (rank, (mut doc, score)) in pairs.into_iter().enumerate() {
            if let Some(s) = score {
                doc.annotate(keys::DENSE_SCORE, s as f64);
            }
            doc.annotate(keys::DENSE_RANK, (rank + 1) as i64);
            doc.annotate(keys::SOURCE_INDEX, source.as_str());
            docs.push(doc);
        }
        docs
    }

    /// Hybrid fusion for one source: candidate-level BM25 by default,
    /// merged global-sparse when an inverted index exists and the mode
    /// allows it.
    fn fuse_source(
        &self,
        source: SourceIndex,
        query: &str,
        dense_docs: Vec<Document>,
    ) -> Result<Vec<Document>> {
        let global = self.sparse.get(&source).filter(|idx| idx.is_built());
        let use_global = match self.config.sparse_mode {
            SparseMode::Global => true,
            SparseMode::Auto => global.is_some(),
            SparseMode::Candidate => false,
        };

        match (use_global, global) {
            (true, Some(index)) => {
                let sparse_k = self.config.sparse_k(source);
                let mut hits = index.search(query, sparse_k);
                for (doc, _) in hits.iter_mut() {
                    doc.annotate(keys::SOURCE_INDEX, source.as_str());
                }
                fuse_with_global(dense_docs, hits, &self.config)
            }
            _ => fuse_candidates(query, dense_docs, self.tokenizer.as_ref(), &self.config),
        }
    }

    /// Bound the rerank input, preferring statutes and rules over case
    /// chunks when overflowing.
    fn cap_for_rerank(
        &self,
        law: Vec<Document>,
        rule: Vec<Document>,
        case: Vec<Document>,
    ) -> Vec<Document> {
        let fields = &self.config.dedupe_key_fields;
        let law = dedupe_documents(law, fields);
        let rule = dedupe_documents(rule, fields);
        let case = dedupe_documents(case, fields);

        let max = self.config.rerank_max_documents;
        let mut base: Vec<Document> = law.into_iter().chain(rule).collect();
        if base.len() >= max {
            base.truncate(max);
            return base;
        }
        let remaining = max - base.len();
        base.extend(case.into_iter().take(remaining));
        base
    }

    /// Run the reranker and keep documents above the threshold. An
    /// empty post-filter set falls back to the reranker-ordered top
    /// `k_law + k_rule + k_case`; failures keep the fused order.
    async fn rerank_select(&self, query: &str, docs: Vec<Document>) -> Vec<Document> {
        if !self.config.enable_rerank || docs.is_empty() {
            return docs;
        }
        let Some(reranker) = self.reranker.as_ref() else {
            return docs;
        };

        let texts: Vec<String> = docs
            .iter()
            .map(|d| truncate_chars(&d.content, self.config.rerank_doc_max_chars))
            .collect();

        let ranked = match timeout(self.call_timeout, reranker.rerank(query, &texts)).await {
            Ok(Ok(ranked)) => ranked,
            Ok(Err(e)) => {
                tracing::warn!("rerank failed, keeping fused order: {e}");
                return docs;
            }
            Err(_) => {
                tracing::warn!("rerank timed out, keeping fused order");
                return docs;
            }
        };
        if ranked.is_empty() {
            return docs;
        }

        let mut selected: Vec<(usize, f64)> = ranked
            .iter()
            .copied()
            .filter(|(_, score)| *score >= self.config.rerank_threshold)
            .collect();
        if selected.is_empty() {
            let desired = self.config.k_total().min(ranked.len());
            selected = ranked[..desired].to_vec();
        }

        tracing::info!(
            "rerank selected {} of {} documents (threshold {})",
            selected.len(),
            docs.len(),
            self.config.rerank_threshold
        );

        selected
            .into_iter()
            .filter_map(|(i, _)| docs.get(i).cloned())
            .collect()
    }

    /// Reassemble the full text of one case from its chunks. Chunks
    /// come back in `chunk_id` order, deduplicated, joined by newlines.
    async fn fetch_full_case(&self, case_no: &str) -> String {
        let fetched = timeout(
            self.call_timeout,
            self.case.search_filtered(
                CASE_CONTEXT_QUERY,
                self.config.case_context_top_k,
                "case_no",
                case_no,
            ),
        )
        .await;
        let pairs = match fetched {
            Ok(Ok(pairs)) => pairs,
            Ok(Err(e)) => {
                tracing::warn!("full case fetch failed for {case_no}: {e}");
                return String::new();
            }
            Err(_) => {
                tracing::warn!("full case fetch timed out for {case_no}");
                return String::new();
            }
        };

        let mut chunks: Vec<Document> = pairs.into_iter().map(|(d, _)| d).collect();
        chunks.sort_by_key(|d| d.meta_str("chunk_id").unwrap_or_default());
        let chunks = dedupe_documents(chunks, &self.config.dedupe_key_fields);
        chunks
            .iter()
            .map(|d| d.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }

    /// Two-stage case expansion: pick the first `case_expand_top_n`
    /// distinct case numbers in reranked order, then replace each chunk
    /// with its reassembled full text. Already-expanded documents pass
    /// through untouched, so re-expansion is a no-op.
    async fn expand_cases(&self, case_chunks: Vec<Document>) -> Vec<Document> {
        let top_n = self.config.case_expand_top_n();
        let mut seen: HashSet<String> = HashSet::new();
        let mut chosen: Vec<Document> = Vec::new();
        for doc in case_chunks {
            if chosen.len() >= top_n {
                break;
            }
            let Some(case_no) = doc.meta_str("case_no") else {
                continue;
            };
            if seen.insert(case_no) {
                chosen.push(doc);
            }
        }

        let expansions = join_all(chosen.iter().map(|doc| async {
            if doc.meta_flag(keys::EXPANDED) {
                return None;
            }
            let case_no = doc.meta_str("case_no")?;
            let full_text = self.fetch_full_case(&case_no).await;
            if full_text.is_empty() {
                None
            } else {
                Some(full_text)
            }
        }))
        .await;

        let mut expanded = Vec::with_capacity(chosen.len());
        for (doc, full_text) in chosen.into_iter().zip(expansions) {
            match full_text {
                Some(text) => {
                    let title = doc
                        .meta_str("title")
                        .or_else(|| doc.meta_str("case_name"))
                        .or_else(|| doc.meta_str("case_no"))
                        .unwrap_or_default();
                    let mut full = Document::with_metadata(
                        format!("[판례 전문: {title}]\n{text}"),
                        doc.metadata.clone(),
                    );
                    full.annotate(keys::EXPANDED, true);
                    expanded.push(full);
                }
                None => expanded.push(doc),
            }
        }

        expanded.truncate(self.config.k_case);
        expanded
    }

    /// Hybrid retrieval across the three sources, ending in the
    /// priority-ordered final document list.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<Document>> {
        tracing::info!("hybrid retrieval for query: {query}");

        let (law_docs, rule_docs, case_docs) = tokio::join!(
            self.fetch_dense(SourceIndex::Law, query),
            self.fetch_dense(SourceIndex::Rule, query),
            self.fetch_dense(SourceIndex::Case, query),
        );

        let law_fused = self.fuse_source(SourceIndex::Law, query, law_docs)?;
        let rule_fused = self.fuse_source(SourceIndex::Rule, query, rule_docs)?;
        let case_fused = self.fuse_source(SourceIndex::Case, query, case_docs)?;

        let combined = self.cap_for_rerank(law_fused, rule_fused, case_fused);
        let selected = self.rerank_select(query, combined).await;
        let selected = dedupe_documents(selected, &self.config.dedupe_key_fields);

        let mut law_ranked = Vec::new();
        let mut rule_ranked = Vec::new();
        let mut case_ranked = Vec::new();
        for doc in selected {
            match doc.source_index() {
                Some(SourceIndex::Law) => law_ranked.push(doc),
                Some(SourceIndex::Rule) => rule_ranked.push(doc),
                Some(SourceIndex::Case) => case_ranked.push(doc),
                None => {}
            }
        }
        law_ranked.truncate(self.config.k_law);
        rule_ranked.truncate(self.config.k_rule);
        let final_cases = self.expand_cases(case_ranked).await;

        let mut final_docs: Vec<Document> = law_ranked
            .into_iter()
            .chain(rule_ranked)
            .chain(final_cases)
            .collect();
        // Stable: equal-priority documents keep fusion order.
        final_docs.sort_by_key(Document::priority);
        Ok(final_docs)
    }

    /// Retrieval plus context assembly, without generation.
    pub async fn retrieve_with_context(&self, query: &str) -> Result<RetrievalResult> {
        let docs = self.retrieve(query).await?;
        let context = format_context(&docs, self.config.rerank_doc_max_chars);
        let references = docs.iter().map(format_reference_short).collect();
        Ok(RetrievalResult {
            docs,
            context,
            references,
        })
    }

    /// The full pipeline: normalize, retrieve, format, generate.
    pub async fn answer_with_trace(&self, user_input: &str, options: &AskOptions) -> Result<AnswerTrace> {
        let normalized_query = if options.skip_normalization {
            user_input.to_string()
        } else {
            self.normalize_query(user_input).await
        };
        if !options.skip_normalization {
            tracing::info!("normalized query: {normalized_query}");
        }

        let docs = self.retrieve(&normalized_query).await?;
        if docs.is_empty() {
            return Ok(AnswerTrace {
                normalized_query,
                references: Vec::new(),
                answer: NO_RESULT_ANSWER.to_string(),
                docs,
            });
        }

        let context_main = format_context(&docs, self.config.rerank_doc_max_chars);
        let context = match options.extra_context.as_deref().and_then(format_contract_block) {
            Some(contract) => format!("{contract}\n\n{context_main}"),
            None => context_main,
        };

        let system_template = if options.use_contract_mode {
            SYSTEM_PROMPT_CONTRACT
        } else {
            SYSTEM_PROMPT_GENERAL
        };
        let system_prompt = system_template.replace("{context}", &context);
        tracing::info!(
            "generating answer in {} mode",
            if options.use_contract_mode { "contract" } else { "general" }
        );

        let messages = vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(normalized_query.clone()),
        ];
        let answer = match timeout(self.call_timeout, self.generator.chat_completion(messages)).await
        {
            Ok(Ok(text)) => {
                let trimmed = text.trim().to_string();
                if trimmed.is_empty() {
                    GENERATION_FAILED_ANSWER.to_string()
                } else {
                    trimmed
                }
            }
            Ok(Err(e)) => {
                tracing::warn!("answer generation failed: {e}");
                GENERATION_FAILED_ANSWER.to_string()
            }
            Err(_) => {
                tracing::warn!("answer generation timed out");
                GENERATION_FAILED_ANSWER.to_string()
            }
        };

        let references = docs.iter().map(format_reference_short).collect();
        Ok(AnswerTrace {
            normalized_query,
            references,
            answer,
            docs,
        })
    }

    /// Convenience wrapper returning only the answer string.
    pub async fn generate_answer(&self, user_input: &str, options: &AskOptions) -> Result<String> {
        Ok(self.answer_with_trace(user_input, options).await?.answer)
    }

    async fn normalize_query(&self, user_input: &str) -> String {
        let Some(normalizer) = self.normalizer.as_ref() else {
            return user_input.to_string();
        };
        match timeout(self.call_timeout, normalizer.normalize(user_input)).await {
            Ok(normalized) => normalized,
            Err(_) => {
                tracing::warn!("query normalization timed out, using original text");
                user_input.to_string()
            }
        }
    }
}
