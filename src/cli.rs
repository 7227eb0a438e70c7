use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(
    name = "folioqa",
    about = "A retrieval-matching question answering engine for a fixed \
             literary corpus"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Path to the questions table (default: <data-dir>/questions.csv)
    #[arg(long, global = true)]
    pub questions: Option<PathBuf>,

    /// Path to the passages table (default: <data-dir>/passages.csv)
    #[arg(long, global = true)]
    pub passages: Option<PathBuf>,

    /// Question encoder to use for matching
    #[arg(long, value_enum, default_value_t = EncoderKind::Hashed, global = true)]
    pub encoder: EncoderKind,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EncoderKind {
    /// Deterministic hashed term-frequency encoder (offline)
    Hashed,
    /// OpenAI-compatible /v1/embeddings endpoint (FOLIOQA_ENCODER_URL)
    Http,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Answer a question against the indexed corpus
    Ask(AskArgs),
    /// Show the top-k canonical question matches for a query
    Match(MatchArgs),
    /// Show corpus, classification, and cache statistics
    Status(StatusArgs),
    /// Re-encode all canonical questions into the vector cache
    Rebuild,
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

#[derive(Debug, clap::Args)]
pub struct AskArgs {
    /// The question to answer
    pub question: String,

    /// Synthesize and refuse via an OpenAI-compatible chat endpoint
    /// (FOLIOQA_GENERATOR_URL) instead of the deterministic template
    #[arg(long)]
    pub generate: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, clap::Args)]
pub struct MatchArgs {
    /// The query to match
    pub question: String,

    /// Number of ranked matches to show
    #[arg(short = 'k', long, default_value_t = 5)]
    pub top_k: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, clap::Args)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, clap::Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: Shell,
}

pub fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "folioqa", &mut std::io::stdout());
}
