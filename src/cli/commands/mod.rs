//! CLI parser and dispatch.

mod batch;
mod extract;
mod helpers;
mod limits;
mod plan;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "docextract")]
#[command(about = "Size-aware document text extraction with strategy fallback")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Show how a document would be processed, without calling any service
    Plan {
        /// Document to inspect
        file: PathBuf,
        /// Admit documents past the recommended maximum size
        #[arg(long)]
        allow_oversized: bool,
    },

    /// Extract text from a document
    Extract {
        /// Document to extract
        file: PathBuf,
        /// Admit documents past the recommended maximum size
        #[arg(long)]
        allow_oversized: bool,
        /// Language hint for the OCR service (repeatable)
        #[arg(short, long = "lang")]
        lang: Vec<String>,
        /// Write extracted text here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print result metadata as JSON
        #[arg(long)]
        json: bool,
    },

    /// Extract several documents with bounded concurrency
    Batch {
        /// Documents to extract
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Directory for the extracted `.txt` files
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Language hint for the OCR service (repeatable)
        #[arg(short, long = "lang")]
        lang: Vec<String>,
    },

    /// Show the effective size limits and chunk budgets
    Limits,
}

/// Load configuration from an explicit path or by discovery.
async fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => {
            let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
            Ok(Config::load_from_path(&PathBuf::from(expanded)).await?)
        }
        None => Ok(Config::load().await),
    }
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config).await?;

    match cli.command {
        Commands::Plan {
            file,
            allow_oversized,
        } => plan::cmd_plan(config, &file, allow_oversized).await,
        Commands::Extract {
            file,
            allow_oversized,
            lang,
            output,
            json,
        } => {
            extract::cmd_extract(
                config,
                &file,
                allow_oversized,
                lang,
                output.as_deref(),
                json,
            )
            .await
        }
        Commands::Batch {
            files,
            output_dir,
            lang,
        } => batch::cmd_batch(config, &files, output_dir.as_deref(), lang).await,
        Commands::Limits => limits::cmd_limits(&config),
    }
}
