//! PDF reading: page text, positioned text blocks and embedded images.

pub mod blocks;
pub mod content;
pub mod raster;

#[cfg(test)]
pub(crate) mod fixtures;
#[cfg(test)]
mod tests;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use image::{DynamicImage, ImageFormat};
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::LayoutConfig;
use crate::layout::{Rect, TextBlock};
use blocks::PageFrame;
use content::{Matrix, PageContent, TextRun, XObjectDraw};

/// Directory (relative to the data directory) holding extracted images
pub const IMAGES_DIR_NAME: &str = "images";

/// Maximum depth followed through the page tree when resolving inherited attributes
const MAX_TREE_DEPTH: usize = 32;
/// Maximum nesting of form XObjects followed when collecting page content
const MAX_FORM_DEPTH: usize = 8;

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("Failed to load PDF {path}: {message}")]
    Load { path: String, message: String },
    #[error("Page {0} does not exist")]
    PageNotFound(u32),
    #[error("Malformed PDF: {0}")]
    Malformed(String),
    #[error("Unsupported image encoding: {0}")]
    UnsupportedImage(String),
    #[error("Image decoding failed: {0}")]
    ImageDecode(String),
    #[error("Failed to write image {path}: {message}")]
    ImageWrite { path: String, message: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// File name of the `index`-th image (1-based) of `page`
#[inline]
pub fn image_file_name(page: u32, index: usize) -> String {
    format!("page{page}_img{index}.png")
}

/// Path of an extracted image relative to the data directory
#[inline]
pub fn relative_image_path(page: u32, index: usize) -> String {
    format!("{IMAGES_DIR_NAME}/{}", image_file_name(page, index))
}

/// A distinct image XObject drawn on a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    pub page: u32,
    /// 1-based position in first-draw order
    pub index: usize,
    pub object_id: ObjectId,
    pub name: String,
}

impl PageImage {
    #[inline]
    pub fn file_name(&self) -> String {
        image_file_name(self.page, self.index)
    }

    #[inline]
    pub fn relative_path(&self) -> String {
        relative_image_path(self.page, self.index)
    }
}

/// Where an image is painted on the page
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePlacement {
    pub rect: Rect,
    /// Index into [`PageLayout::images`]
    pub image: usize,
}

/// Text blocks and image placements of one page, top-left origin
#[derive(Debug, Clone, PartialEq)]
pub struct PageLayout {
    pub page: u32,
    pub width: f32,
    pub height: f32,
    pub text_blocks: Vec<TextBlock>,
    pub images: Vec<PageImage>,
    pub placements: Vec<ImagePlacement>,
}

impl PageLayout {
    /// Concatenated block text, one block per paragraph
    #[inline]
    pub fn text(&self) -> String {
        self.text_blocks
            .iter()
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

pub struct PdfDocument {
    document: Document,
    pages: BTreeMap<u32, ObjectId>,
}

impl std::fmt::Debug for PdfDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfDocument")
            .field("pages", &self.pages.len())
            .finish_non_exhaustive()
    }
}

impl PdfDocument {
    #[inline]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PdfError> {
        let path = path.as_ref();
        let document = Document::load(path).map_err(|e| PdfError::Load {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        debug!("Loaded {}", path.display());
        Ok(Self::from_document(document))
    }

    #[inline]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PdfError> {
        let document = Document::load_mem(bytes).map_err(|e| PdfError::Load {
            path: "<memory>".to_string(),
            message: e.to_string(),
        })?;
        Ok(Self::from_document(document))
    }

    fn from_document(document: Document) -> Self {
        let pages = document.get_pages();
        Self { document, pages }
    }

    #[inline]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// 1-based page numbers in document order
    #[inline]
    pub fn page_numbers(&self) -> Vec<u32> {
        self.pages.keys().copied().collect()
    }

    fn page_id(&self, page: u32) -> Result<ObjectId, PdfError> {
        self.pages
            .get(&page)
            .copied()
            .ok_or(PdfError::PageNotFound(page))
    }

    /// Plain text of a page.
    ///
    /// Uses lopdf's text extraction and falls back to the text of the page
    /// layout when that fails.
    #[inline]
    pub fn page_text(&self, page: u32) -> Result<String, PdfError> {
        self.page_id(page)?;
        match self.document.extract_text(&[page]) {
            Ok(text) => Ok(text),
            Err(e) => {
                warn!("Text extraction failed on page {}, using layout text: {}", page, e);
                let layout = self.page_layout(page, &LayoutConfig::default())?;
                Ok(layout.text())
            }
        }
    }

    /// Positioned text blocks and image placements of a page
    #[inline]
    pub fn page_layout(&self, page: u32, config: &LayoutConfig) -> Result<PageLayout, PdfError> {
        let page_id = self.page_id(page)?;
        let frame = self.page_frame(page_id);
        let PageContent {
            mut runs,
            draws: page_draws,
        } = self.page_content(page_id)?;
        let resources = self
            .inherited_attribute(page_id, b"Resources")
            .and_then(|object| self.resolve_dict(object));

        let mut draws = Vec::new();
        self.collect_image_draws(&page_draws, resources, 0, &mut runs, &mut draws);

        let mut images: Vec<PageImage> = Vec::new();
        let mut seen: HashMap<ObjectId, usize> = HashMap::new();
        let mut placements = Vec::with_capacity(draws.len());

        for draw in draws {
            let image = *seen.entry(draw.object_id).or_insert_with(|| {
                images.push(PageImage {
                    page,
                    index: images.len() + 1,
                    object_id: draw.object_id,
                    name: draw.name,
                });
                images.len() - 1
            });

            placements.push(ImagePlacement {
                rect: frame.to_top_left(&draw.rect),
                image,
            });
        }

        let text_blocks = blocks::group_runs(&runs, &frame, config);
        debug!(
            "Page {}: {} text runs, {} blocks, {} images",
            page,
            runs.len(),
            text_blocks.len(),
            images.len()
        );

        Ok(PageLayout {
            page,
            width: frame.width(),
            height: frame.height(),
            text_blocks,
            images,
            placements,
        })
    }

    /// Distinct images drawn on a page, numbered in first-draw order
    #[inline]
    pub fn page_images(&self, page: u32) -> Result<Vec<PageImage>, PdfError> {
        Ok(self.page_layout(page, &LayoutConfig::default())?.images)
    }

    #[inline]
    pub fn decode_image(&self, image: &PageImage) -> Result<DynamicImage, PdfError> {
        let stream = self
            .document
            .get_object(image.object_id)
            .and_then(Object::as_stream)
            .map_err(|e| {
                PdfError::Malformed(format!("Image {} is not a stream: {e}", image.name))
            })?;
        raster::decode_image(stream)
    }

    /// Decode an image and write it as PNG to `path`
    #[inline]
    pub fn save_image(&self, image: &PageImage, path: &Path) -> Result<(), PdfError> {
        let decoded = self.decode_image(image)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        decoded
            .save_with_format(path, ImageFormat::Png)
            .map_err(|e| PdfError::ImageWrite {
                path: path.display().to_string(),
                message: e.to_string(),
            })
    }

    fn page_content(&self, page_id: ObjectId) -> Result<PageContent, PdfError> {
        let bytes = self
            .document
            .get_page_content(page_id)
            .map_err(|e| PdfError::Malformed(format!("Unreadable page content: {e}")))?;
        let decoded = Content::decode(&bytes)
            .map_err(|e| PdfError::Malformed(format!("Invalid content stream: {e}")))?;
        Ok(content::interpret(&decoded.operations))
    }

    /// Page box from the (possibly inherited) MediaBox, US Letter when absent
    fn page_frame(&self, page_id: ObjectId) -> PageFrame {
        let values: Option<Vec<f32>> = self
            .inherited_attribute(page_id, b"MediaBox")
            .and_then(|object| self.resolve(object).as_array().ok())
            .and_then(|items| items.iter().map(content::number).collect());

        match values.as_deref() {
            Some(&[x0, y0, x1, y1]) => {
                let rect = Rect::new(x0, y0, x1, y1);
                PageFrame {
                    left: rect.x0,
                    bottom: rect.y0,
                    right: rect.x1,
                    top: rect.y1,
                }
            }
            _ => {
                warn!("Page has no usable MediaBox, assuming US Letter");
                PageFrame::US_LETTER
            }
        }
    }

    /// Resolve `Do` draws against `resources`, keeping image draws in paint order.
    ///
    /// Form XObjects are painted in place: their content is interpreted with
    /// the form matrix on top of the CTM at the `Do`, using the form's own
    /// resources (or the caller's when it has none). Text shown inside forms
    /// is appended to `runs`.
    fn collect_image_draws<'a>(
        &'a self,
        draws: &[XObjectDraw],
        resources: Option<&'a Dictionary>,
        depth: usize,
        runs: &mut Vec<TextRun>,
        found: &mut Vec<ImageDraw>,
    ) {
        let xobjects = resources
            .and_then(|resources| resources.get(b"XObject").ok())
            .and_then(|object| self.resolve_dict(object));

        for draw in draws {
            let name = String::from_utf8_lossy(&draw.name).into_owned();
            let Some(Object::Reference(object_id)) =
                xobjects.and_then(|xobjects| xobjects.get(&draw.name).ok())
            else {
                debug!("XObject /{} is not an indirect resource, skipping", name);
                continue;
            };
            let Ok(stream) = self
                .document
                .get_object(*object_id)
                .and_then(Object::as_stream)
            else {
                debug!("XObject /{} is not a stream, skipping", name);
                continue;
            };

            if raster::is_image_xobject(&stream.dict) {
                found.push(ImageDraw {
                    object_id: *object_id,
                    name,
                    rect: draw.rect,
                });
            } else if is_form_xobject(&stream.dict) {
                if depth >= MAX_FORM_DEPTH {
                    warn!("Form /{} nested too deeply, skipping", name);
                    continue;
                }
                let form = match form_content(stream, &draw.ctm) {
                    Ok(form) => form,
                    Err(e) => {
                        warn!("Skipping form /{}: {}", name, e);
                        continue;
                    }
                };
                let form_resources = stream
                    .dict
                    .get(b"Resources")
                    .ok()
                    .and_then(|object| self.resolve_dict(object))
                    .or(resources);

                runs.extend(form.runs);
                self.collect_image_draws(&form.draws, form_resources, depth + 1, runs, found);
            } else {
                debug!("Skipping XObject /{} of unsupported subtype", name);
            }
        }
    }

    /// Look up a page attribute, following `Parent` links for inherited ones
    fn inherited_attribute(&self, page_id: ObjectId, key: &[u8]) -> Option<&Object> {
        let mut node = self.document.get_dictionary(page_id).ok()?;
        for _ in 0..MAX_TREE_DEPTH {
            if let Ok(value) = node.get(key) {
                return Some(value);
            }
            let Ok(Object::Reference(parent)) = node.get(b"Parent") else {
                return None;
            };
            node = self.document.get_dictionary(*parent).ok()?;
        }
        None
    }

    fn resolve<'a>(&'a self, object: &'a Object) -> &'a Object {
        match object {
            Object::Reference(id) => self.document.get_object(*id).unwrap_or(object),
            other => other,
        }
    }

    fn resolve_dict<'a>(&'a self, object: &'a Object) -> Option<&'a Dictionary> {
        self.resolve(object).as_dict().ok()
    }
}

/// An image XObject painted on a page, possibly from inside a form
#[derive(Debug)]
struct ImageDraw {
    object_id: ObjectId,
    name: String,
    rect: Rect,
}

fn is_form_xobject(dict: &Dictionary) -> bool {
    matches!(dict.get(b"Subtype"), Ok(Object::Name(name)) if name.as_slice() == b"Form")
}

/// Interpret a form XObject painted with `ctm` in effect
fn form_content(stream: &Stream, ctm: &Matrix) -> Result<PageContent, PdfError> {
    let bytes = if raster::stream_filters(&stream.dict).is_empty() {
        stream.content.clone()
    } else {
        stream
            .decompressed_content()
            .map_err(|e| PdfError::Malformed(format!("Unreadable form content: {e}")))?
    };
    let decoded = Content::decode(&bytes)
        .map_err(|e| PdfError::Malformed(format!("Invalid form content: {e}")))?;

    let form_matrix = stream
        .dict
        .get(b"Matrix")
        .ok()
        .and_then(|object| object.as_array().ok())
        .and_then(|items| Matrix::from_operands(items))
        .unwrap_or(Matrix::IDENTITY);

    Ok(content::interpret_at(
        &decoded.operations,
        form_matrix.then(ctm),
    ))
}
