//! CLI command definitions and parsing
use crate::dataset::Dataset;
use crate::pipeline::SearchMethod;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "ragline",
    version,
    about = "Multi-stage document retrieval with grounded answer generation",
    long_about = "ragline answers natural-language queries against precomputed document collections. \
                  It combines TF-IDF candidate retrieval, dense embedding reranking and chunk-level \
                  nearest neighbour search, and can pack the retrieved text into a token-budgeted \
                  prompt for a local generation model."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/ragline/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search a dataset, or answer a question from it
    Query {
        /// Query text
        query: String,

        /// Dataset to search
        #[arg(short, long, value_enum)]
        dataset: Dataset,

        /// Retrieval method
        #[arg(short, long, value_enum, default_value = "hybrid")]
        method: SearchMethod,

        /// Number of results (or context items) instead of the configured depth
        #[arg(short = 'n', long)]
        top_n: Option<usize>,

        /// Answer style for generating methods
        /// (default, comparative, bullet_points, beginner_friendly)
        #[arg(short, long, default_value = "default")]
        instruction: String,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Print the full text of a document
    Document {
        /// Document identifier
        doc_id: String,

        /// Dataset the document belongs to
        #[arg(short, long, value_enum)]
        dataset: Dataset,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
