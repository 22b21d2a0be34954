use anyhow::{Context, Result};
use std::path::Path;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::database::VectorStore;
use crate::embeddings::OllamaClient;
use crate::indexer::{IndexMode, Indexer};
use crate::search::Searcher;
use crate::server::{self, AppState};

/// Characters of page text shown by `extract`
const PREVIEW_CHARS: usize = 200;
/// Records shown by `status`
const STATUS_SAMPLE_SIZE: usize = 3;

/// First `max_chars` characters of `text`
fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Print a text preview of every page and write its images to the images directory.
///
/// Returns the number of images written.
#[inline]
pub fn extract_pdf(config: &Config, pdf_path: &Path) -> Result<usize> {
    info!("Extracting {}", pdf_path.display());

    let document = crate::pdf::PdfDocument::open(pdf_path)
        .with_context(|| format!("Failed to open {}", pdf_path.display()))?;

    let images_dir = config.images_dir();
    std::fs::create_dir_all(&images_dir).with_context(|| {
        format!("Failed to create images directory {}", images_dir.display())
    })?;

    let mut saved = 0;
    for page in document.page_numbers() {
        let text = document
            .page_text(page)
            .with_context(|| format!("Failed to read text of page {page}"))?;

        println!("\n--- Page {page} ---");
        println!("{}", preview(&text, PREVIEW_CHARS));

        let images = document
            .page_images(page)
            .with_context(|| format!("Failed to list images of page {page}"))?;

        for image in &images {
            let target = images_dir.join(image.file_name());
            match document.save_image(image, &target) {
                Ok(()) => {
                    println!("Saved image: {}", image.relative_path());
                    saved += 1;
                }
                Err(e) => {
                    warn!("Skipping image {} on page {}: {}", image.name, page, e);
                }
            }
        }
    }

    info!(
        "Extracted {} pages, {} images saved",
        document.page_count(),
        saved
    );
    Ok(saved)
}

/// Index a PDF into the vector collection
#[inline]
pub async fn index_pdf(config: Config, pdf_path: &Path, mode: IndexMode, reset: bool) -> Result<()> {
    let mut indexer = Indexer::new(config)
        .await
        .context("Failed to initialize indexer")?;

    let stats = indexer.index_pdf(pdf_path, mode, reset).await?;

    println!("Indexing completed ({mode} mode)");
    println!("  Pages processed: {}", stats.pages_processed);
    println!("  Chunks stored: {}", stats.chunks_stored);
    if stats.chunks_skipped > 0 {
        println!("  Chunks skipped: {}", stats.chunks_skipped);
    }
    println!("  Images saved: {}", stats.images_saved);

    Ok(())
}

/// Embed `query` and print the nearest chunks
#[inline]
pub async fn run_query(config: &Config, query: &str, limit: usize) -> Result<()> {
    let vector_store = VectorStore::new(config)
        .await
        .context("Failed to initialize LanceDB vector store")?;
    let ollama_client = OllamaClient::new(config).context("Failed to initialize Ollama client")?;
    let searcher = Searcher::new(ollama_client, vector_store);

    let results = searcher.search(query, limit).await?;

    if results.is_empty() {
        println!("No results. Index a PDF first with 'pdf-rag index <pdf>'.");
        return Ok(());
    }

    for (rank, result) in results.iter().enumerate() {
        match result.distance {
            Some(distance) => println!(
                "{}. Page {} (distance {:.4})",
                rank + 1,
                result.page,
                distance
            ),
            None => println!("{}. Page {}", rank + 1, result.page),
        }
        println!("   {}", preview(&result.text, PREVIEW_CHARS).replace('\n', " "));
        for image in &result.images {
            println!("   🖼️  {}", image);
        }
        println!();
    }

    Ok(())
}

/// Run the HTTP server until Ctrl-C
#[inline]
pub async fn serve(mut config: Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config.validate().context("Invalid server settings")?;

    let state = AppState::from_config(&config).await?;
    server::serve(state, &config.server.bind_address()).await
}

/// Show the collection size, a few stored records and embedding service health
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    println!("📊 PDF-RAG Status Report");
    println!("{}", "=".repeat(50));
    println!();
    println!("📁 Data directory: {}", config.get_base_dir().display());
    println!();

    println!("🔍 Vector Database Status:");
    match VectorStore::new(config).await {
        Ok(store) => match store.count().await {
            Ok(count) => {
                println!("   ✅ LanceDB: Connected");
                println!("   📄 Chunks: {}", count);
                if let Some(dimension) = store.vector_dimension() {
                    println!("   🔢 Dimension: {}", dimension);
                }

                match store.peek(STATUS_SAMPLE_SIZE).await {
                    Ok(sample) => {
                        for chunk in &sample {
                            println!(
                                "   #{} page {}: {}",
                                chunk.id,
                                chunk.page,
                                preview(&chunk.text, 60).replace('\n', " ")
                            );
                        }
                    }
                    Err(e) => println!("   ⚠️  Sample unavailable - {}", e),
                }
            }
            Err(e) => println!("   ⚠️  LanceDB: Connected but unreadable - {}", e),
        },
        Err(e) => {
            error!("Vector store unavailable: {}", e);
            println!("   ❌ LanceDB: Failed to open - {}", e);
        }
    }
    println!();

    println!("🤖 Ollama Status:");
    match OllamaClient::new(config) {
        Ok(client) => match client.health_check() {
            Ok(()) => {
                println!(
                    "   ✅ Ollama: Connected ({}:{})",
                    config.ollama.host, config.ollama.port
                );
                println!("   📋 Model: {}", config.ollama.model);
            }
            Err(e) => {
                println!("   ⚠️  Ollama: Unhealthy - {:#}", e);
            }
        },
        Err(e) => {
            println!("   ❌ Ollama: Failed to connect - {}", e);
        }
    }

    Ok(())
}
