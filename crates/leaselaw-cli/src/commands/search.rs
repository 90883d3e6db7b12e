//! Search command: retrieval trace without generation

use crate::app::SearchArgs;
use anyhow::Result;
use leaselaw_core::RetrievalPipeline;

pub async fn run(args: SearchArgs, pipeline: &RetrievalPipeline, json: bool) -> Result<()> {
    let query = args.query.join(" ");
    let result = pipeline.retrieve_with_context(&query).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if result.references.is_empty() {
        println!("검색 결과가 없습니다.");
        return Ok(());
    }

    println!("참고 자료 ({}건):", result.references.len());
    for reference in &result.references {
        println!("  - {reference}");
    }
    if args.full {
        println!("\n{}", result.context);
    }
    Ok(())
}
