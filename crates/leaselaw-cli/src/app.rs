//! CLI argument definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "leaselaw")]
#[command(
    author,
    version,
    about = "Grounded QA over Korean housing-lease law (statutes, rules, cases)"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Emit JSON instead of plain text
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ask a question and generate a grounded answer
    Ask(AskArgs),

    /// Retrieval only: print references and the assembled context
    Search(SearchArgs),

    /// Show the resolved service configuration
    Status,
}

#[derive(Args)]
pub struct AskArgs {
    /// The question, in plain Korean
    #[arg(required = true)]
    pub question: Vec<String>,

    /// Contract OCR text file, analyzed as SECTION 0
    #[arg(long)]
    pub contract: Option<PathBuf>,

    /// Force the contract-analysis prompt
    #[arg(long)]
    pub contract_mode: bool,

    /// Skip colloquial-to-legal query normalization
    #[arg(long)]
    pub raw: bool,
}

#[derive(Args)]
pub struct SearchArgs {
    /// The query, in plain Korean
    #[arg(required = true)]
    pub query: Vec<String>,

    /// Print the full SECTION context, not only references
    #[arg(long)]
    pub full: bool,
}
