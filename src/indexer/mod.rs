// Indexer module
// Turns the pages of a PDF into embedded chunks in the vector store


use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::database::{ChunkRecord, VectorStore};
use crate::embeddings::OllamaClient;
use crate::layout::{ImageBlock, Rect, associate_images};
use crate::pdf::{PageImage, PdfDocument};

/// How a PDF is cut into chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum IndexMode {
    /// One chunk per page with every image on the page
    #[default]
    Page,
    /// One chunk per text block with the images placed next to it
    Layout,
}

impl std::fmt::Display for IndexMode {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Page => write!(f, "page"),
            Self::Layout => write!(f, "layout"),
        }
    }
}

/// Statistics about an indexing run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexingStats {
    pub pages_processed: usize,
    pub images_saved: usize,
    pub chunks_stored: usize,
    pub chunks_skipped: usize,
}

/// A chunk waiting for its embedding
#[derive(Debug)]
struct PendingChunk {
    text: String,
    bbox: Option<Rect>,
    images: Vec<String>,
}

pub struct Indexer {
    config: Config,
    vector_store: VectorStore,
    ollama_client: OllamaClient,
}

impl Indexer {
    #[inline]
    pub async fn new(config: Config) -> Result<Self> {
        let vector_store = VectorStore::new(&config)
            .await
            .context("Failed to initialize LanceDB vector store")?;

        let ollama_client =
            OllamaClient::new(&config).context("Failed to initialize Ollama client")?;

        Ok(Self {
            config,
            vector_store,
            ollama_client,
        })
    }

    #[inline]
    pub const fn vector_store(&self) -> &VectorStore {
        &self.vector_store
    }

    /// Index every page of a PDF.
    ///
    /// Chunks whose embedding cannot be generated are logged and skipped.
    /// Images that cannot be decoded are logged and left out. Anything else
    /// aborts the run.
    #[inline]
    pub async fn index_pdf(
        &mut self,
        pdf_path: &Path,
        mode: IndexMode,
        reset: bool,
    ) -> Result<IndexingStats> {
        let document = PdfDocument::open(pdf_path)
            .with_context(|| format!("Failed to open {}", pdf_path.display()))?;

        if reset {
            info!("Resetting collection before indexing");
            self.vector_store
                .reset()
                .await
                .context("Failed to reset vector store")?;
        }

        let images_dir = self.config.images_dir();
        std::fs::create_dir_all(&images_dir).with_context(|| {
            format!("Failed to create images directory {}", images_dir.display())
        })?;

        let mut next_id = self
            .vector_store
            .next_id()
            .await
            .context("Failed to read collection size")?;

        info!(
            "Indexing {} ({} pages, {} mode)",
            pdf_path.display(),
            document.page_count(),
            mode
        );

        let bar = if console::user_attended_stderr() {
            ProgressBar::new(document.page_count() as u64).with_style(
                ProgressStyle::with_template("{bar:30} [{pos}/{len}] Indexing {msg}")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        };

        let mut stats = IndexingStats::default();

        for page in document.page_numbers() {
            bar.set_message(format!("page {page}"));

            let pending = match mode {
                IndexMode::Page => self.page_chunks(&document, page, &mut stats)?,
                IndexMode::Layout => self.layout_chunks(&document, page, &mut stats)?,
            };

            let mut records = Vec::with_capacity(pending.len());
            for chunk in pending {
                match self.ollama_client.generate_embedding(&chunk.text) {
                    Ok(vector) => {
                        records.push(ChunkRecord {
                            id: next_id,
                            text: chunk.text,
                            vector,
                            page,
                            bbox: chunk.bbox,
                            images: chunk.images,
                            indexed_at: Utc::now().to_rfc3339(),
                        });
                        next_id += 1;
                    }
                    Err(e) => {
                        warn!(
                            "Skipping chunk on page {}, embedding unavailable: {:#}",
                            page, e
                        );
                        stats.chunks_skipped += 1;
                    }
                }
            }

            self.vector_store
                .add_chunks(&records)
                .await
                .with_context(|| format!("Failed to store chunks for page {page}"))?;

            stats.chunks_stored += records.len();
            stats.pages_processed += 1;
            bar.inc(1);
        }

        bar.finish_and_clear();

        info!(
            "Indexed {} pages: {} chunks stored, {} skipped, {} images saved",
            stats.pages_processed, stats.chunks_stored, stats.chunks_skipped, stats.images_saved
        );
        Ok(stats)
    }

    /// Whole-page chunk; pages without text produce nothing
    fn page_chunks(
        &self,
        document: &PdfDocument,
        page: u32,
        stats: &mut IndexingStats,
    ) -> Result<Vec<PendingChunk>> {
        let text = document
            .page_text(page)
            .with_context(|| format!("Failed to read text of page {page}"))?;
        let text = text.trim();
        if text.is_empty() {
            debug!("Page {} has no text, skipping", page);
            return Ok(Vec::new());
        }

        let images = document
            .page_images(page)
            .with_context(|| format!("Failed to list images of page {page}"))?;
        let saved = self.save_images(document, &images, stats);

        let images = images
            .iter()
            .zip(saved)
            .filter(|(_, saved)| *saved)
            .map(|(image, _)| image.relative_path())
            .collect();

        Ok(vec![PendingChunk {
            text: text.to_string(),
            bbox: None,
            images,
        }])
    }

    /// One chunk per text block with associated images
    fn layout_chunks(
        &self,
        document: &PdfDocument,
        page: u32,
        stats: &mut IndexingStats,
    ) -> Result<Vec<PendingChunk>> {
        let layout = document
            .page_layout(page, &self.config.layout)
            .with_context(|| format!("Failed to analyze layout of page {page}"))?;
        let saved = self.save_images(document, &layout.images, stats);

        let image_blocks: Vec<ImageBlock> = layout
            .placements
            .iter()
            .filter(|placement| saved.get(placement.image).copied().unwrap_or(false))
            .map(|placement| ImageBlock {
                rect: placement.rect,
                path: layout.images[placement.image].relative_path(),
            })
            .collect();

        let blocks = associate_images(
            &layout.text_blocks,
            &image_blocks,
            &self.config.layout.association(),
        );
        debug!(
            "Page {}: {} blocks with text, {} image placements",
            page,
            blocks.len(),
            image_blocks.len()
        );

        Ok(blocks
            .into_iter()
            .map(|block| PendingChunk {
                text: block.text,
                bbox: Some(block.rect),
                images: block.images,
            })
            .collect())
    }

    /// Write page images as PNG; returns which ones were saved
    fn save_images(
        &self,
        document: &PdfDocument,
        images: &[PageImage],
        stats: &mut IndexingStats,
    ) -> Vec<bool> {
        let images_dir = self.config.images_dir();
        images
            .iter()
            .map(|image| {
                let path = images_dir.join(image.file_name());
                match document.save_image(image, &path) {
                    Ok(()) => {
                        debug!("Saved {}", path.display());
                        stats.images_saved += 1;
                        true
                    }
                    Err(e) => {
                        warn!(
                            "Skipping image {} on page {}: {}",
                            image.name, image.page, e
                        );
                        false
                    }
                }
            })
            .collect()
    }
}
