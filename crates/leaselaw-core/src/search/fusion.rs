//! Multi-channel rank fusion
//!
//! Combines dense rank, BM25-over-body rank and BM25-over-title rank
//! into one hybrid ordering. Channels are fused by Reciprocal Rank
//! Fusion by default; rank-sum and weighted variants are available.

use super::bm25::{score_candidates, score_texts};
use super::{dedupe_documents, dedupe_key, keys, Document, Tokenizer};
use crate::config::RetrievalConfig;
use crate::error::{LeaselawError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Rank offset for documents absent from a channel.
const MISSING_RANK_FILL: usize = 1000;

/// Fusion rule for combining per-channel ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FusionMode {
    #[default]
    Rrf,
    RankSum,
    Weighted,
}

/// Fuse parallel rank channels into one score per document.
///
/// All channels must rank the same document set, so every channel list
/// must have the same length. Higher output scores mean better.
pub fn fuse_rank_channels(
    channels: &[Vec<usize>],
    weights: &[f64],
    mode: FusionMode,
    rrf_k: u32,
) -> Result<Vec<f64>> {
    if channels.is_empty() {
        return Ok(Vec::new());
    }
    let n = channels[0].len();
    if channels.iter().any(|c| c.len() != n) {
        return Err(LeaselawError::Search(
            "rank channels must have equal lengths".to_string(),
        ));
    }
    if weights.len() != channels.len() {
        return Err(LeaselawError::Search(
            "one weight per rank channel is required".to_string(),
        ));
    }
    if n == 0 {
        return Ok(Vec::new());
    }

    match mode {
        FusionMode::Rrf => {
            let k = rrf_k.max(1) as f64;
            let mut out = vec![0.0; n];
            for (channel, w) in channels.iter().zip(weights) {
                for (i, rank) in channel.iter().enumerate() {
                    out[i] += w / (k + *rank as f64);
                }
            }
            Ok(out)
        }
        FusionMode::RankSum => {
            if n == 1 {
                return Ok(vec![weights.iter().sum()]);
            }
            let to_unit = |r: usize| 1.0 - (r as f64 - 1.0) / (n as f64 - 1.0);
            let mut out = vec![0.0; n];
            for (channel, w) in channels.iter().zip(weights) {
                for (i, rank) in channel.iter().enumerate() {
                    out[i] += w * to_unit(*rank);
                }
            }
            Ok(out)
        }
        FusionMode::Weighted => {
            let mut out = vec![0.0; n];
            for (channel, w) in channels.iter().zip(weights) {
                let inv: Vec<f64> = channel.iter().map(|r| 1.0 / (*r).max(1) as f64).collect();
                for (i, v) in min_max_normalize(&inv).iter().enumerate() {
                    out[i] += w * v;
                }
            }
            Ok(out)
        }
    }
}

fn min_max_normalize(xs: &[f64]) -> Vec<f64> {
    if xs.is_empty() {
        return Vec::new();
    }
    let mn = xs.iter().cloned().fold(f64::INFINITY, f64::min);
    let mx = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if (mx - mn).abs() < f64::EPSILON {
        return vec![1.0; xs.len()];
    }
    xs.iter().map(|x| (x - mn) / (mx - mn)).collect()
}

/// Candidate-level hybrid fusion: score the dense candidates with BM25
/// over bodies and titles, then fuse the three rank channels.
///
/// Documents come back sorted by `__hybrid_score` descending with a
/// dense `__hybrid_rank` starting at 1; ties keep dense order.
pub fn fuse_candidates(
    query: &str,
    docs: Vec<Document>,
    tokenizer: &dyn Tokenizer,
    config: &RetrievalConfig,
) -> Result<Vec<Document>> {
    if !config.enable_bm25 {
        return Ok(docs);
    }
    let mut docs = dedupe_documents(docs, &config.dedupe_key_fields);
    let n = docs.len();
    if n <= 1 {
        return Ok(docs);
    }

    let dense_ranks: Vec<usize> = docs
        .iter()
        .enumerate()
        .map(|(i, d)| d.meta_i64(keys::DENSE_RANK).map(|r| r as usize).unwrap_or(i + 1))
        .collect();

    let body_params = config.bm25_body_params();
    let body_scores = score_candidates(query, &docs, tokenizer, &body_params);
    let body_ranks = ranks_by_score(&body_scores, &dense_ranks);

    let mut title_scores = vec![0.0; n];
    let mut title_ranks = vec![n + MISSING_RANK_FILL; n];
    if config.enable_bm25_title {
        let titles: Vec<String> = docs
            .iter()
            .map(|d| d.meta_str(&config.bm25_title_field).unwrap_or_default())
            .collect();
        let title_refs: Vec<&str> = titles.iter().map(String::as_str).collect();
        title_scores = score_texts(query, &title_refs, tokenizer, &config.bm25_title_params());
        title_ranks = ranks_by_score(&title_scores, &dense_ranks);
    }

    for (i, d) in docs.iter_mut().enumerate() {
        d.annotate(keys::BM25_SCORE, body_scores[i]);
        d.annotate(keys::BM25_RANK, body_ranks[i] as i64);
        d.annotate(keys::BM25_TITLE_SCORE, title_scores[i]);
        d.annotate(keys::BM25_TITLE_RANK, title_ranks[i] as i64);
    }

    let w_dense = config.hybrid_dense_weight;
    let w_title = if config.enable_bm25_title {
        config.hybrid_sparse_weight * config.hybrid_sparse_title_ratio
    } else {
        0.0
    };
    let w_body = config.hybrid_sparse_weight - w_title;

    let fused = fuse_rank_channels(
        &[dense_ranks, body_ranks, title_ranks],
        &[w_dense, w_body, w_title],
        config.hybrid_fusion,
        config.rrf_k,
    )?;

    Ok(order_by_fused(docs, &fused))
}

/// Global-sparse hybrid fusion: merge the dense candidates with the
/// inverted-index top-k, then fuse the two rank channels. Documents
/// missing from a channel are filled past that channel's worst rank.
pub fn fuse_with_global(
    dense_docs: Vec<Document>,
    sparse_hits: Vec<(Document, f64)>,
    config: &RetrievalConfig,
) -> Result<Vec<Document>> {
    let mut sparse_docs = Vec::with_capacity(sparse_hits.len());
    for (rank, (mut d, score)) in sparse_hits.into_iter().enumerate() {
        d.annotate(keys::BM25_SCORE, score);
        d.annotate(keys::BM25_RANK, (rank + 1) as i64);
        sparse_docs.push(d);
    }

    let mut dense_rank_map: HashMap<String, usize> = HashMap::new();
    for (i, d) in dense_docs.iter().enumerate() {
        let key = dedupe_key(d, &config.dedupe_key_fields);
        let rank = d.meta_i64(keys::DENSE_RANK).map(|r| r as usize).unwrap_or(i + 1);
        let entry = dense_rank_map.entry(key).or_insert(rank);
        *entry = (*entry).min(rank);
    }
    let mut sparse_rank_map: HashMap<String, usize> = HashMap::new();
    for (i, d) in sparse_docs.iter().enumerate() {
        let key = dedupe_key(d, &config.dedupe_key_fields);
        let rank = d.meta_i64(keys::BM25_RANK).map(|r| r as usize).unwrap_or(i + 1);
        let entry = sparse_rank_map.entry(key).or_insert(rank);
        *entry = (*entry).min(rank);
    }

    let merged = dedupe_documents(
        dense_docs.into_iter().chain(sparse_docs).collect(),
        &config.dedupe_key_fields,
    );
    if merged.len() <= 1 {
        return Ok(merged);
    }

    let fill_dense = dense_rank_map.values().max().copied().unwrap_or(MISSING_RANK_FILL)
        + MISSING_RANK_FILL;
    let fill_sparse = sparse_rank_map.values().max().copied().unwrap_or(MISSING_RANK_FILL)
        + MISSING_RANK_FILL;

    let mut dense_ranks = Vec::with_capacity(merged.len());
    let mut sparse_ranks = Vec::with_capacity(merged.len());
    for d in &merged {
        let key = dedupe_key(d, &config.dedupe_key_fields);
        dense_ranks.push(dense_rank_map.get(&key).copied().unwrap_or(fill_dense));
        sparse_ranks.push(sparse_rank_map.get(&key).copied().unwrap_or(fill_sparse));
    }

    let fused = fuse_rank_channels(
        &[dense_ranks, sparse_ranks],
        &[config.hybrid_dense_weight, config.hybrid_sparse_weight],
        config.hybrid_fusion,
        config.rrf_k,
    )?;

    Ok(order_by_fused(merged, &fused))
}

/// Dense ranks 1..n by score descending; ties go to the lower dense rank.
fn ranks_by_score(scores: &[f64], dense_ranks: &[usize]) -> Vec<usize> {
    let n = scores.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(dense_ranks[a].cmp(&dense_ranks[b]))
    });
    let mut ranks = vec![0; n];
    for (rank, idx) in order.into_iter().enumerate() {
        ranks[idx] = rank + 1;
    }
    ranks
}

/// Sort by fused score descending (stable, so ties keep input order)
/// and renumber `__hybrid_rank` densely from 1.
fn order_by_fused(docs: Vec<Document>, fused: &[f64]) -> Vec<Document> {
    let mut pairs: Vec<(f64, Document)> = fused.iter().copied().zip(docs).collect();
    pairs.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    pairs
        .into_iter()
        .enumerate()
        .map(|(rank, (score, mut d))| {
            d.annotate(keys::HYBRID_SCORE, score);
            d.annotate(keys::HYBRID_RANK, (rank + 1) as i64);
            d
        })
        .collect()
}
