//! LLM and reranker trait definitions

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Chat message for completion requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Chat completion capability (normalizer and generator models).
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Generate a chat completion
    async fn chat_completion(&self, messages: Vec<ChatMessage>) -> Result<String>;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Embedding generation capability (query vectors for dense search).
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for batch of texts
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Cross-encoder reranking capability.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Rerank documents for a query. Returns `(input index, relevance
    /// score in [0, 1])` pairs ordered most relevant first.
    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<(usize, f64)>>;

    /// Get model name
    fn model_name(&self) -> &str;
}
