// LanceDB vector database module
// Handles vector storage and similarity search for PDF chunks


pub mod vector_store;

use serde::{Deserialize, Serialize};

use crate::layout::Rect;

/// A chunk of PDF text with its embedding, as written to LanceDB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Unique identifier, continuing from the collection's row count
    pub id: u64,
    /// Trimmed page or block text
    pub text: String,
    /// The embedding of `text`
    pub vector: Vec<f32>,
    /// 1-based page number
    pub page: u32,
    /// Block rectangle, top-left origin; only set in layout mode
    pub bbox: Option<Rect>,
    /// Relative image paths, no duplicates
    pub images: Vec<String>,
    /// RFC 3339 insertion time
    pub indexed_at: String,
}

/// A chunk read back from LanceDB, without its vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    pub id: u64,
    pub text: String,
    pub page: u32,
    pub bbox: Option<Rect>,
    pub images: Vec<String>,
    pub indexed_at: String,
    /// L2 distance to the query vector; only set for search results
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
}
