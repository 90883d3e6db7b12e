//! Status command: show the resolved service configuration

use anyhow::Result;
use leaselaw_core::ServiceConfig;
use serde_json::json;

pub fn run(config: &ServiceConfig, json: bool) -> Result<()> {
    let key_state = |key: &Option<String>| if key.is_some() { "set" } else { "unset" };

    if json {
        let summary = json!({
            "indices": {
                "law": { "name": config.vector.law.name, "host": config.vector.law.host },
                "rule": { "name": config.vector.rule.name, "host": config.vector.rule.host },
                "case": { "name": config.vector.case.name, "host": config.vector.case.host },
                "api_key": key_state(&config.vector.api_key),
            },
            "embedding": { "model": config.embedding.model, "api_key": key_state(&config.embedding.api_key) },
            "normalizer": { "model": config.normalizer.model, "api_key": key_state(&config.normalizer.api_key) },
            "generator": { "model": config.generator.model, "api_key": key_state(&config.generator.api_key) },
            "reranker": {
                "model": config.reranker.model,
                "enabled": config.retrieval.enable_rerank,
                "api_key": key_state(&config.reranker.api_key),
            },
            "retrieval": config.retrieval,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("indices:");
    println!("  law:  {} ({})", config.vector.law.name, config.vector.law.host);
    println!("  rule: {} ({})", config.vector.rule.name, config.vector.rule.host);
    println!("  case: {} ({})", config.vector.case.name, config.vector.case.host);
    println!("  api key: {}", key_state(&config.vector.api_key));
    println!("embedding: {} (key {})", config.embedding.model, key_state(&config.embedding.api_key));
    println!("normalizer: {} (key {})", config.normalizer.model, key_state(&config.normalizer.api_key));
    println!("generator: {} (key {})", config.generator.model, key_state(&config.generator.api_key));
    println!(
        "reranker: {} (enabled {}, key {})",
        config.reranker.model,
        config.retrieval.enable_rerank,
        key_state(&config.reranker.api_key)
    );
    println!(
        "widths: k_law={} k_rule={} k_case={} multiplier={}",
        config.retrieval.k_law,
        config.retrieval.k_rule,
        config.retrieval.k_case,
        config.retrieval.search_multiplier
    );
    Ok(())
}
