//! Query normalization
//!
//! Rewrites colloquial renting vocabulary into the statutory terms the
//! indexed corpus uses, via a chat model primed with the keyword
//! dictionary. Mapped words surface as `원어(법률용어)` in the output.

use super::prompts::{dictionary_text, NORMALIZATION_PROMPT};
use super::{ChatClient, ChatMessage};
use std::sync::Arc;

pub struct QueryNormalizer {
    client: Arc<dyn ChatClient>,
}

impl QueryNormalizer {
    pub fn new(client: Arc<dyn ChatClient>) -> Self {
        Self { client }
    }

    /// Normalize a user query. Any failure (or an empty rewrite) falls
    /// back to the original text; normalization is best-effort.
    pub async fn normalize(&self, query: &str) -> String {
        let prompt = NORMALIZATION_PROMPT
            .replace("{dictionary}", &dictionary_text())
            .replace("{question}", query);

        match self.client.chat_completion(vec![ChatMessage::user(prompt)]).await {
            Ok(rewritten) => {
                let out = rewritten.trim();
                if out.is_empty() {
                    query.to_string()
                } else {
                    out.to_string()
                }
            }
            Err(e) => {
                tracing::warn!("query normalization failed, using original text: {e}");
                query.to_string()
            }
        }
    }
}
