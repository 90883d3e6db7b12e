//! Tokenizers for BM25 scoring
//!
//! Two variants behind one capability: a regex tokenizer that matches
//! runs of Hangul/Latin/digits, and (feature `korean-morph`) a lindera
//! ko-dic morphological tokenizer that keeps content-bearing POS only.
//! The choice is process-wide and fails over silently to regex.

use crate::config::RetrievalConfig;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;

/// Token producer over Korean+Latin text.
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<String>;
}

lazy_static! {
    static ref TOKEN_PATTERN: Regex = Regex::new(r"[가-힣a-zA-Z0-9]+").expect("valid token pattern");
}

/// Regex tokenizer: lowercases, then matches `[가-힣a-zA-Z0-9]+` runs.
#[derive(Debug, Clone)]
pub struct RegexTokenizer {
    min_length: usize,
}

impl RegexTokenizer {
    pub fn new(min_length: usize) -> Self {
        Self { min_length }
    }
}

impl Default for RegexTokenizer {
    fn default() -> Self {
        Self { min_length: 1 }
    }
}

impl Tokenizer for RegexTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        let lowered = text.to_lowercase();
        TOKEN_PATTERN
            .find_iter(&lowered)
            .map(|m| m.as_str().to_string())
            .filter(|t| t.chars().count() >= self.min_length)
            .collect()
    }
}

#[cfg(feature = "korean-morph")]
pub use morph::MorphTokenizer;

#[cfg(feature = "korean-morph")]
mod morph {
    use super::Tokenizer;
    use crate::error::{LeaselawError, Result};
    use lindera::dictionary::{load_dictionary_from_kind, DictionaryKind};
    use lindera::mode::Mode;
    use lindera::segmenter::Segmenter;
    use lindera::tokenizer::Tokenizer as LinderaTokenizer;

    /// POS tags kept for scoring: common/proper nouns, verbs,
    /// adjectives, foreign words and Han characters.
    const KEPT_POS: [&str; 6] = ["NNG", "NNP", "VV", "VA", "SL", "SH"];

    /// Morphological tokenizer over the embedded ko-dic dictionary.
    pub struct MorphTokenizer {
        inner: LinderaTokenizer,
        min_length: usize,
    }

    impl MorphTokenizer {
        pub fn new(min_length: usize) -> Result<Self> {
            let dictionary = load_dictionary_from_kind(DictionaryKind::KoDic)
                .map_err(|e| LeaselawError::Search(format!("ko-dic load failed: {e}")))?;
            let segmenter = Segmenter::new(Mode::Normal, dictionary, None);
            Ok(Self {
                inner: LinderaTokenizer::new(segmenter),
                min_length,
            })
        }
    }

    impl Tokenizer for MorphTokenizer {
        fn tokenize(&self, text: &str) -> Vec<String> {
            if text.is_empty() {
                return Vec::new();
            }
            let mut tokens = match self.inner.tokenize(text) {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!("morphological tokenize failed: {e}");
                    return Vec::new();
                }
            };
            let mut out = Vec::new();
            for token in tokens.iter_mut() {
                let surface = token.text.to_string();
                if surface.chars().count() < self.min_length {
                    continue;
                }
                let details = token.details();
                let pos = details.first().copied().unwrap_or("");
                if KEPT_POS.contains(&pos) {
                    out.push(surface.to_lowercase());
                }
            }
            out
        }
    }
}

/// Pick the process-wide tokenizer for the given configuration.
///
/// Prefers the morphological variant when compiled in and enabled;
/// init failure degrades to the regex tokenizer with a warning.
pub fn select_tokenizer(config: &RetrievalConfig) -> Arc<dyn Tokenizer> {
    #[cfg(feature = "korean-morph")]
    if config.bm25_use_morph {
        match MorphTokenizer::new(1) {
            Ok(t) => {
                tracing::info!("using ko-dic morphological tokenizer for BM25");
                return Arc::new(t);
            }
            Err(e) => {
                tracing::warn!("morphological tokenizer unavailable, using regex: {e}");
            }
        }
    }
    #[cfg(not(feature = "korean-morph"))]
    if config.bm25_use_morph {
        tracing::debug!("korean-morph feature not compiled in; using regex tokenizer");
    }
    Arc::new(RegexTokenizer::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regex_tokenizer_splits_hangul_latin_digits() {
        let tok = RegexTokenizer::default();
        let tokens = tok.tokenize("임대인이 Deposit 500만원을 반환");
        assert_eq!(tokens, vec!["임대인이", "deposit", "500만원을", "반환"]);
    }

    #[test]
    fn regex_tokenizer_lowercases() {
        let tok = RegexTokenizer::default();
        assert_eq!(tok.tokenize("BM25 Plus"), vec!["bm25", "plus"]);
    }

    #[test]
    fn regex_tokenizer_min_length_filters() {
        let tok = RegexTokenizer::new(2);
        assert_eq!(tok.tokenize("a 임대 b 차임"), vec!["임대", "차임"]);
    }

    #[test]
    fn empty_input_yields_no_tokens() {
        let tok = RegexTokenizer::default();
        assert!(tok.tokenize("").is_empty());
        assert!(tok.tokenize("!?.,~").is_empty());
    }

    #[test]
    fn select_falls_back_to_regex_by_default() {
        let cfg = RetrievalConfig::default();
        let tok = select_tokenizer(&cfg);
        assert_eq!(tok.tokenize("보증금"), vec!["보증금"]);
    }
}
