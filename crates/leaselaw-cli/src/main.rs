//! Leaselaw CLI
//!
//! Grounded consultation over Korean housing-lease law from the terminal.

use anyhow::{Context, Result};
use clap::Parser;
use leaselaw_core::{
    select_tokenizer, DenseIndex, Embedder, HttpLlmClient, HttpReranker, PineconeIndex,
    RetrievalPipeline, ServiceConfig, SourceIndex,
};
use std::sync::Arc;

mod app;
mod commands;

use app::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(default_level.into()),
        )
        .init();

    let config = ServiceConfig::load()?;

    match cli.command {
        Commands::Ask(args) => {
            let pipeline = build_pipeline(&config)?;
            commands::ask::run(args, &pipeline, cli.json).await
        }
        Commands::Search(args) => {
            let pipeline = build_pipeline(&config)?;
            commands::search::run(args, &pipeline, cli.json).await
        }
        Commands::Status => commands::status::run(&config, cli.json),
    }
}

/// Wire the pipeline from the service configuration.
fn build_pipeline(config: &ServiceConfig) -> Result<RetrievalPipeline> {
    let embedder: Arc<dyn Embedder> = Arc::new(HttpLlmClient::new(config.embedding.clone())?);

    let api_key = config
        .vector
        .api_key
        .clone()
        .context("vector index api key missing (set PINECONE_API_KEY or config vector.api_key)")?;

    let index = |source: SourceIndex| -> Result<Arc<dyn DenseIndex>> {
        let endpoint = config.vector.endpoint(source).clone();
        Ok(Arc::new(PineconeIndex::new(
            endpoint,
            api_key.clone(),
            Arc::clone(&embedder),
            config.vector.timeout_secs,
        )?))
    };

    let generator = Arc::new(HttpLlmClient::new(config.generator.clone())?);
    let tokenizer = select_tokenizer(&config.retrieval);

    let mut pipeline = RetrievalPipeline::new(
        config.retrieval.clone(),
        index(SourceIndex::Law)?,
        index(SourceIndex::Rule)?,
        index(SourceIndex::Case)?,
        tokenizer,
        generator,
    )?;

    if config.normalizer.api_key.is_some() {
        pipeline = pipeline.with_normalizer(Arc::new(HttpLlmClient::new(config.normalizer.clone())?));
    } else {
        tracing::warn!("no normalizer credentials; queries are used as-is");
    }

    if config.retrieval.enable_rerank {
        if config.reranker.api_key.is_some() {
            pipeline = pipeline.with_reranker(Arc::new(HttpReranker::new(config.reranker.clone())?));
        } else {
            tracing::warn!("rerank enabled but no reranker credentials; skipping rerank");
        }
    }

    Ok(pipeline)
}
