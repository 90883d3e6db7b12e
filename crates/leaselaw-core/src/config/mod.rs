//! Configuration management
//!
//! Two layers: [`RetrievalConfig`] holds every retrieval/fusion knob and
//! validates at construction; [`ServiceConfig`] wires the external
//! collaborators (vector indices, embeddings, chat models, reranker)
//! from a yaml file with environment-variable fallbacks.

use crate::error::{LeaselawError, Result};
use crate::search::{Bm25Algorithm, Bm25Params, FusionMode, SourceIndex};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where sparse (BM25) candidates come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SparseMode {
    /// Score the dense candidate list only.
    Candidate,
    /// Search the prebuilt inverted index.
    Global,
    /// Global when an index was built for the source, else candidate.
    #[default]
    Auto,
}

/// Retrieval and fusion parameters. All fields have working defaults;
/// [`RetrievalConfig::validate`] rejects inconsistent combinations at
/// construction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    // Per-source result widths
    pub k_law: usize,
    pub k_rule: usize,
    pub k_case: usize,
    /// Over-fetch factor applied before fusion.
    pub search_multiplier: usize,

    // Case retrieval and two-stage expansion
    pub case_candidate_k: usize,
    /// Distinct cases to reassemble; defaults to `k_case`.
    pub case_expand_top_n: Option<usize>,
    /// Chunks fetched per case number during reassembly.
    pub case_context_top_k: usize,

    // BM25
    pub enable_bm25: bool,
    pub sparse_mode: SparseMode,
    pub sparse_k_law: Option<usize>,
    pub sparse_k_rule: Option<usize>,
    pub sparse_k_case: Option<usize>,
    pub bm25_algorithm: Bm25Algorithm,
    pub bm25_k1: f64,
    pub bm25_b: f64,
    /// Prefer the morphological tokenizer when compiled in.
    #[serde(alias = "bm25_use_kiwi")]
    pub bm25_use_morph: bool,
    pub bm25_max_doc_chars: usize,

    // BM25 over the title metadata field
    pub enable_bm25_title: bool,
    pub bm25_title_field: String,
    pub bm25_title_max_chars: usize,
    pub hybrid_sparse_title_ratio: f64,

    // Fusion
    pub hybrid_fusion: FusionMode,
    pub hybrid_dense_weight: f64,
    pub hybrid_sparse_weight: f64,
    pub rrf_k: u32,

    // Reranking
    pub enable_rerank: bool,
    pub rerank_threshold: f64,
    pub rerank_max_documents: usize,
    pub rerank_doc_max_chars: usize,

    // Dedup identity
    pub dedupe_key_fields: Vec<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k_law: 7,
            k_rule: 7,
            k_case: 3,
            search_multiplier: 4,
            case_candidate_k: 40,
            case_expand_top_n: None,
            case_context_top_k: 50,
            enable_bm25: true,
            sparse_mode: SparseMode::Auto,
            sparse_k_law: None,
            sparse_k_rule: None,
            sparse_k_case: None,
            bm25_algorithm: Bm25Algorithm::Okapi,
            bm25_k1: 1.8,
            bm25_b: 0.85,
            bm25_use_morph: true,
            bm25_max_doc_chars: 4000,
            enable_bm25_title: true,
            bm25_title_field: "title".to_string(),
            bm25_title_max_chars: 512,
            hybrid_sparse_title_ratio: 0.6,
            hybrid_fusion: FusionMode::Rrf,
            hybrid_dense_weight: 0.5,
            hybrid_sparse_weight: 0.5,
            rrf_k: 60,
            enable_rerank: true,
            rerank_threshold: 0.2,
            rerank_max_documents: 80,
            rerank_doc_max_chars: 2600,
            dedupe_key_fields: vec!["chunk_id".to_string(), "id".to_string()],
        }
    }
}

impl RetrievalConfig {
    /// Reject inconsistent parameter combinations.
    pub fn validate(&self) -> Result<()> {
        if self.search_multiplier < 1 {
            return Err(config_error("search_multiplier must be at least 1"));
        }
        if self.case_candidate_k < 1 || self.case_context_top_k < 1 {
            return Err(config_error("case_* values must be at least 1"));
        }
        if self.enable_bm25 {
            if self.bm25_k1 <= 0.0 {
                return Err(config_error("bm25_k1 must be positive"));
            }
            if !(0.0..=1.0).contains(&self.bm25_b) {
                return Err(config_error("bm25_b must be within [0, 1]"));
            }
            if self.enable_bm25_title {
                if !(0.0..=1.0).contains(&self.hybrid_sparse_title_ratio) {
                    return Err(config_error("hybrid_sparse_title_ratio must be within [0, 1]"));
                }
                if self.bm25_title_max_chars < 32 {
                    return Err(config_error("bm25_title_max_chars must be at least 32"));
                }
            }
        }
        if self.rrf_k < 1 {
            return Err(config_error("rrf_k must be at least 1"));
        }
        if self.hybrid_dense_weight < 0.0 || self.hybrid_sparse_weight < 0.0 {
            return Err(config_error("hybrid weights must be non-negative"));
        }
        if self.hybrid_dense_weight == 0.0 && self.hybrid_sparse_weight == 0.0 {
            return Err(config_error("hybrid weights must not both be zero"));
        }
        if self.dedupe_key_fields.is_empty() {
            return Err(config_error("dedupe_key_fields must not be empty"));
        }
        Ok(())
    }

    /// Requested width for a source before fusion over-fetch trimming.
    pub fn k_for(&self, source: SourceIndex) -> usize {
        match source {
            SourceIndex::Law => self.k_law,
            SourceIndex::Rule => self.k_rule,
            SourceIndex::Case => self.k_case,
        }
    }

    /// Dense candidate fetch width for a source.
    pub fn dense_fetch_k(&self, source: SourceIndex) -> usize {
        match source {
            SourceIndex::Law => self.k_law * self.search_multiplier.max(1),
            SourceIndex::Rule => self.k_rule * self.search_multiplier.max(1),
            SourceIndex::Case => self.case_candidate_k,
        }
    }

    /// Global-sparse fetch width for a source; explicit overrides win.
    pub fn sparse_k(&self, source: SourceIndex) -> usize {
        let mult = self.search_multiplier.max(1);
        match source {
            SourceIndex::Law => self.sparse_k_law.unwrap_or(self.k_law * mult),
            SourceIndex::Rule => self.sparse_k_rule.unwrap_or(self.k_rule * mult),
            SourceIndex::Case => self
                .sparse_k_case
                .unwrap_or_else(|| self.case_candidate_k.max(self.k_case * mult)),
        }
    }

    /// Distinct cases to reassemble during expansion.
    pub fn case_expand_top_n(&self) -> usize {
        self.case_expand_top_n.unwrap_or(self.k_case)
    }

    /// Combined final width across the three sources.
    pub fn k_total(&self) -> usize {
        self.k_law + self.k_rule + self.k_case
    }

    pub fn bm25_body_params(&self) -> Bm25Params {
        Bm25Params {
            k1: self.bm25_k1,
            b: self.bm25_b,
            algorithm: self.bm25_algorithm,
            max_doc_chars: self.bm25_max_doc_chars,
        }
    }

    pub fn bm25_title_params(&self) -> Bm25Params {
        Bm25Params {
            k1: self.bm25_k1,
            b: self.bm25_b,
            algorithm: self.bm25_algorithm,
            max_doc_chars: self.bm25_title_max_chars,
        }
    }
}

fn config_error(msg: &str) -> LeaselawError {
    LeaselawError::Config(msg.to_string())
}

/// One named dense index and the host serving its query endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEndpoint {
    pub name: String,
    pub host: String,
}

impl IndexEndpoint {
    fn from_env(name_var: &str, host_var: &str, default_name: &str) -> Self {
        let name = std::env::var(name_var).unwrap_or_else(|_| default_name.to_string());
        let host = std::env::var(host_var)
            .unwrap_or_else(|_| format!("https://{name}.svc.pinecone.io"));
        Self { name, host }
    }
}

/// The three dense collections plus the shared index credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    pub law: IndexEndpoint,
    pub rule: IndexEndpoint,
    pub case: IndexEndpoint,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("PINECONE_API_KEY").ok(),
            law: IndexEndpoint::from_env("LAW_INDEX", "LAW_INDEX_HOST", "law-index"),
            rule: IndexEndpoint::from_env("RULE_INDEX", "RULE_INDEX_HOST", "rule-index"),
            case: IndexEndpoint::from_env("CASE_INDEX", "CASE_INDEX_HOST", "case-index"),
            timeout_secs: default_timeout(),
        }
    }
}

impl VectorConfig {
    pub fn endpoint(&self, source: SourceIndex) -> &IndexEndpoint {
        match source {
            SourceIndex::Law => &self.law,
            SourceIndex::Rule => &self.rule,
            SourceIndex::Case => &self.case,
        }
    }
}

/// One chat/embedding/rerank HTTP endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub url: String,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub temperature: f64,
}

/// External-service wiring for the whole pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default = "default_embedding_endpoint")]
    pub embedding: EndpointConfig,
    #[serde(default = "default_normalizer_endpoint")]
    pub normalizer: EndpointConfig,
    #[serde(default = "default_generator_endpoint")]
    pub generator: EndpointConfig,
    #[serde(default = "default_reranker_endpoint")]
    pub reranker: EndpointConfig,
    /// Retrieval knobs, embedded so one file configures everything.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            vector: VectorConfig::default(),
            embedding: default_embedding_endpoint(),
            normalizer: default_normalizer_endpoint(),
            generator: default_generator_endpoint(),
            reranker: default_reranker_endpoint(),
            retrieval: RetrievalConfig::default(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_embedding_endpoint() -> EndpointConfig {
    EndpointConfig {
        url: std::env::var("UPSTAGE_API_BASE")
            .unwrap_or_else(|_| "https://api.upstage.ai/v1/solar".to_string()),
        model: std::env::var("EMBEDDING_MODEL")
            .unwrap_or_else(|_| "solar-embedding-1-large-passage".to_string()),
        api_key: std::env::var("UPSTAGE_API_KEY").ok(),
        timeout_secs: default_timeout(),
        temperature: 0.0,
    }
}

fn default_normalizer_endpoint() -> EndpointConfig {
    EndpointConfig {
        url: std::env::var("UPSTAGE_API_BASE")
            .unwrap_or_else(|_| "https://api.upstage.ai/v1/solar".to_string()),
        model: std::env::var("NORMALIZE_MODEL").unwrap_or_else(|_| "solar-pro2".to_string()),
        api_key: std::env::var("UPSTAGE_API_KEY").ok(),
        timeout_secs: default_timeout(),
        temperature: 0.0,
    }
}

fn default_generator_endpoint() -> EndpointConfig {
    EndpointConfig {
        url: std::env::var("OPENAI_API_BASE")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
        model: std::env::var("GENERATION_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
        api_key: std::env::var("OPENAI_API_KEY").ok(),
        timeout_secs: default_timeout(),
        temperature: 0.1,
    }
}

fn default_reranker_endpoint() -> EndpointConfig {
    EndpointConfig {
        url: std::env::var("COHERE_API_BASE")
            .unwrap_or_else(|_| "https://api.cohere.com".to_string()),
        model: std::env::var("RERANK_MODEL")
            .unwrap_or_else(|_| "rerank-multilingual-v3.0".to_string()),
        api_key: std::env::var("COHERE_API_KEY").ok(),
        timeout_secs: default_timeout(),
        temperature: 0.0,
    }
}

impl ServiceConfig {
    /// Load config from the default path, falling back to env-derived
    /// defaults when no file exists.
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path())
    }

    pub fn load_from(path: PathBuf) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: ServiceConfig = serde_yaml::from_str(&content)?;
            config.retrieval.validate()?;
            Ok(config)
        } else {
            Ok(ServiceConfig::default())
        }
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::CONFIG_DIR_NAME)
            .join("config.yml")
    }
}
