//! HTTP client for OpenAI-compatible chat and embedding services

use super::{ChatClient, ChatMessage, Embedder};
use crate::config::EndpointConfig;
use crate::error::{LeaselawError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Client for any OpenAI-compatible `/chat/completions` and
/// `/embeddings` endpoint (OpenAI, Upstage Solar, vLLM, ...).
pub struct HttpLlmClient {
    http: reqwest::Client,
    config: EndpointConfig,
}

impl HttpLlmClient {
    pub fn new(config: EndpointConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.config.url.trim_end_matches('/'), path);
        let mut req = self.http.post(url);
        if let Some(ref key) = self.config.api_key {
            req = req.bearer_auth(key);
        }
        req
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[async_trait]
impl ChatClient for HttpLlmClient {
    async fn chat_completion(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: &messages,
            temperature: self.config.temperature,
        };
        let response = self
            .request("chat/completions")
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LeaselawError::Service("chat completion returned no choices".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl Embedder for HttpLlmClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let texts = [text.to_string()];
        let mut vectors = self.embed_batch(&texts).await?;
        vectors
            .pop()
            .ok_or_else(|| LeaselawError::Service("embedding service returned no vectors".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = EmbeddingRequest {
            model: &self.config.model,
            input: texts.iter().map(String::as_str).collect(),
        };
        let response = self
            .request("embeddings")
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let parsed: EmbeddingResponse = response.json().await?;
        if parsed.data.len() != texts.len() {
            return Err(LeaselawError::Service(format!(
                "embedding count mismatch: sent {}, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
