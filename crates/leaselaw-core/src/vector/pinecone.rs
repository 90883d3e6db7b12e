//! Pinecone-style HTTP adapter for a dense index
//!
//! Embeds the query with the configured [`Embedder`], then POSTs the
//! vector to the index host's `/query` endpoint. Chunk text travels in
//! the match metadata (`text` key); the remaining metadata fields pass
//! through to the [`Document`] untouched.

use super::DenseIndex;
use crate::config::IndexEndpoint;
use crate::error::{LeaselawError, Result};
use crate::llm::Embedder;
use crate::search::Document;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub struct PineconeIndex {
    http: reqwest::Client,
    endpoint: IndexEndpoint,
    api_key: String,
    embedder: Arc<dyn Embedder>,
}

impl PineconeIndex {
    pub fn new(
        endpoint: IndexEndpoint,
        api_key: impl Into<String>,
        embedder: Arc<dyn Embedder>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(LeaselawError::Config(
                "vector index api_key must not be empty".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            http,
            endpoint,
            api_key,
            embedder,
        })
    }

    async fn query(&self, text: &str, k: usize, filter: Option<Value>) -> Result<Vec<(Document, Option<f32>)>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let vector = self.embedder.embed(text).await?;
        let url = format!("{}/query", self.endpoint.host.trim_end_matches('/'));
        let body = QueryRequest {
            vector,
            top_k: k,
            include_metadata: true,
            filter,
        };
        let response = self
            .http
            .post(url)
            .header("Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let parsed: QueryResponse = response.json().await?;
        Ok(parsed.matches.into_iter().map(into_document).collect())
    }
}

#[derive(Serialize)]
struct QueryRequest {
    vector: Vec<f32>,
    #[serde(rename = "topK")]
    top_k: usize,
    #[serde(rename = "includeMetadata")]
    include_metadata: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<Value>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: Option<f32>,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

fn into_document(m: QueryMatch) -> (Document, Option<f32>) {
    let mut metadata: HashMap<String, Value> =
        m.metadata.map(|o| o.into_iter().collect()).unwrap_or_default();
    let content = metadata
        .remove("text")
        .or_else(|| metadata.remove("content"))
        .and_then(|v| match v {
            Value::String(s) => Some(s),
            _ => None,
        })
        .unwrap_or_default();
    metadata.entry("id".to_string()).or_insert_with(|| json!(m.id));
    (Document::with_metadata(content, metadata), m.score)
}

#[async_trait]
impl DenseIndex for PineconeIndex {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<(Document, Option<f32>)>> {
        self.query(query, k, None).await
    }

    async fn search_filtered(
        &self,
        query: &str,
        k: usize,
        field: &str,
        value: &str,
    ) -> Result<Vec<(Document, Option<f32>)>> {
        let filter = json!({ field: { "$eq": value } });
        self.query(query, k, Some(filter)).await
    }

    fn name(&self) -> &str {
        &self.endpoint.name
    }
}
