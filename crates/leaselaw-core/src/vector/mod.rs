//! Dense retrieval: the vector-index capability and its HTTP adapter

mod pinecone;

pub use pinecone::PineconeIndex;

use crate::error::Result;
use crate::search::Document;
use async_trait::async_trait;

/// A k-NN service over pre-embedded chunks. Scores are similarity
/// values when the backend reports them; `None` keeps the backend's
/// order without inventing scores.
#[async_trait]
pub trait DenseIndex: Send + Sync {
    /// Top-k documents for a free-text query.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<(Document, Option<f32>)>>;

    /// Top-k documents whose metadata `field` equals `value`. The case
    /// index must support this for `case_no`.
    async fn search_filtered(
        &self,
        query: &str,
        k: usize,
        field: &str,
        value: &str,
    ) -> Result<Vec<(Document, Option<f32>)>>;

    /// Index name, for logs.
    fn name(&self) -> &str;
}
