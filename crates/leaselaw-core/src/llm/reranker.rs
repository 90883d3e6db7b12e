//! HTTP reranker adapter (Cohere-style rerank API)

use super::Reranker;
use crate::config::EndpointConfig;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reranker over a `POST /v1/rerank` endpoint returning
/// `(index, relevance_score)` pairs.
pub struct HttpReranker {
    http: reqwest::Client,
    config: EndpointConfig,
}

impl HttpReranker {
    pub fn new(config: EndpointConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankEntry>,
}

#[derive(Deserialize)]
struct RerankEntry {
    index: usize,
    relevance_score: f64,
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<(usize, f64)>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/v1/rerank", self.config.url.trim_end_matches('/'));
        let body = RerankRequest {
            model: &self.config.model,
            query,
            documents,
            top_n: documents.len(),
        };
        let mut req = self.http.post(url).json(&body);
        if let Some(ref key) = self.config.api_key {
            req = req.bearer_auth(key);
        }
        let response = req.send().await?.error_for_status()?;
        let parsed: RerankResponse = response.json().await?;
        Ok(parsed
            .results
            .into_iter()
            .map(|r| (r.index, r.relevance_score))
            .collect())
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
