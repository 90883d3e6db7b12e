//! Leaselaw Core Library
//!
//! Hybrid retrieval and fusion core for Korean housing-lease law QA.
//!
//! # Features
//! - Tri-source dense retrieval (statutes / rules / cases) over
//!   external vector indices
//! - Candidate-level and global BM25 with Okapi/Plus scoring
//! - Multi-channel rank fusion (RRF, rank-sum, weighted)
//! - Cross-encoder reranking with threshold fallback
//! - Case-chunk reassembly and legal-hierarchy context ordering

pub mod config;
pub mod error;
pub mod llm;
pub mod search;
pub mod vector;

pub use config::{
    EndpointConfig, IndexEndpoint, RetrievalConfig, ServiceConfig, SparseMode, VectorConfig,
};
pub use error::{Error, LeaselawError, Result};
pub use llm::{
    ChatClient, ChatMessage, Embedder, HttpLlmClient, HttpReranker, QueryNormalizer, Reranker,
};
pub use search::{
    dedupe_documents, format_context, format_reference_line, format_reference_short,
    fuse_rank_channels, score_candidates, score_texts, select_tokenizer, AnswerTrace, AskOptions,
    Bm25Algorithm, Bm25InvertedIndex, Bm25Params, Document, FusionMode, RegexTokenizer,
    RetrievalPipeline, RetrievalResult, SourceIndex, Tokenizer,
};
pub use vector::{DenseIndex, PineconeIndex};

/// Default config directory name
pub const CONFIG_DIR_NAME: &str = "leaselaw";
