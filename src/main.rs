use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pdf_rag::commands::{extract_pdf, index_pdf, run_query, serve, show_status};
use pdf_rag::config::{Config, resolve_data_dir, run_interactive_config, show_config};
use pdf_rag::indexer::IndexMode;
use pdf_rag::search::DEFAULT_LIMIT;
use pdf_rag::{RagError, Result};

#[derive(Parser)]
#[command(name = "pdf-rag")]
#[command(about = "Extract, index and search PDF text and images with local embeddings")]
#[command(version)]
struct Cli {
    /// Data directory holding config.toml, vectors/ and images/ (default ~/.pdf-rag)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a preview of each page and save embedded images
    Extract {
        /// Path to the PDF file
        pdf: PathBuf,
    },
    /// Embed the PDF into the vector collection
    Index {
        /// Path to the PDF file
        pdf: PathBuf,
        /// One chunk per page, or one per layout block with nearby images attached
        #[arg(long, value_enum, default_value_t = IndexMode::Page)]
        mode: IndexMode,
        /// Drop the existing collection before indexing
        #[arg(long)]
        reset: bool,
    },
    /// Search the collection for chunks similar to a question
    Query {
        /// Free-text question
        text: String,
        /// Number of results to return
        #[arg(long, default_value_t = DEFAULT_LIMIT)]
        limit: usize,
    },
    /// Start the HTTP API
    Serve {
        /// Host to bind, overriding the configured one
        #[arg(long)]
        host: Option<String>,
        /// Port to bind, overriding the configured one
        #[arg(long)]
        port: Option<u16>,
    },
    /// Show collection size, sample records and Ollama health
    Status,
    /// Configure Ollama connection and server settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let data_dir = resolve_data_dir(cli.data_dir).map_err(|e| RagError::Config(e.to_string()))?;
    let load_config = || Config::load(&data_dir);

    match cli.command {
        Commands::Extract { pdf } => {
            extract_pdf(&load_config()?, &pdf)?;
        }
        Commands::Index { pdf, mode, reset } => {
            index_pdf(load_config()?, &pdf, mode, reset).await?;
        }
        Commands::Query { text, limit } => {
            run_query(&load_config()?, &text, limit).await?;
        }
        Commands::Serve { host, port } => {
            serve(load_config()?, host, port).await?;
        }
        Commands::Status => {
            show_status(&load_config()?).await?;
        }
        Commands::Config { show } => {
            if show {
                show_config(&load_config()?);
            } else {
                run_interactive_config(&data_dir)?;
            }
        }
    }

    Ok(())
}
