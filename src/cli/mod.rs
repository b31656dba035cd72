pub mod run;
pub mod schema;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cvscan")]
#[command(
    author,
    version,
    about = "Score resumes against checklists by repeated LLM review"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose/debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Review every document against every view and write reports
    Run(RunArgs),

    /// Print JSON Schema for config validation
    Schema,
}

#[derive(Parser, Clone)]
pub struct RunArgs {
    /// Path to config file
    #[arg(short, long, default_value = "cvscan.yaml")]
    pub config: PathBuf,

    /// Override samples per document
    #[arg(long)]
    pub repeats: Option<u32>,

    /// Override max concurrent LLM requests
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// API key for the LLM endpoint
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Override chat completions endpoint
    #[arg(long)]
    pub api_url: Option<String>,

    /// Override model
    #[arg(long)]
    pub model: Option<String>,

    /// Override output directory
    #[arg(long)]
    pub report_dir: Option<PathBuf>,

    /// Run specific views only (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub views: Option<Vec<String>>,

    /// Ignore the response cache for this run
    #[arg(long)]
    pub no_cache: bool,

    /// Show plan without executing
    #[arg(long)]
    pub dry_run: bool,
}
