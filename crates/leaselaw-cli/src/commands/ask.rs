//! Ask command: full question-to-answer pipeline

use crate::app::AskArgs;
use anyhow::{Context, Result};
use leaselaw_core::{AskOptions, RetrievalPipeline};

pub async fn run(args: AskArgs, pipeline: &RetrievalPipeline, json: bool) -> Result<()> {
    let question = args.question.join(" ");

    let contract = match args.contract {
        Some(path) => Some(
            std::fs::read_to_string(&path)
                .with_context(|| format!("reading contract text from {}", path.display()))?,
        ),
        None => None,
    };

    let options = AskOptions {
        skip_normalization: args.raw,
        use_contract_mode: args.contract_mode || contract.is_some(),
        extra_context: contract,
    };

    let trace = pipeline.answer_with_trace(&question, &options).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&trace)?);
        return Ok(());
    }

    if trace.normalized_query != question {
        println!("질문(표준화): {}\n", trace.normalized_query);
    }
    println!("{}\n", trace.answer);
    if !trace.references.is_empty() {
        println!("참고 자료:");
        for reference in &trace.references {
            println!("  - {reference}");
        }
    }
    Ok(())
}
