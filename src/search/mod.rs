//! Query embedding and nearest-chunk lookup.


use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::database::{StoredChunk, VectorStore};
use crate::embeddings::OllamaClient;
use crate::layout::Rect;

pub const DEFAULT_LIMIT: usize = 3;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Failed to get embedding for query: {0}")]
    Embedding(String),
    #[error("Vector store error: {0}")]
    Store(String),
}

/// One retrieved chunk as returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub text: String,
    pub images: Vec<String>,
    pub page: u32,
    pub bbox: Option<Rect>,
    pub distance: Option<f32>,
}

impl From<StoredChunk> for QueryResult {
    #[inline]
    fn from(chunk: StoredChunk) -> Self {
        Self {
            text: chunk.text,
            images: chunk.images,
            page: chunk.page,
            bbox: chunk.bbox,
            distance: chunk.distance,
        }
    }
}

pub struct Searcher {
    ollama_client: OllamaClient,
    vector_store: VectorStore,
}

impl Searcher {
    #[inline]
    pub const fn new(ollama_client: OllamaClient, vector_store: VectorStore) -> Self {
        Self {
            ollama_client,
            vector_store,
        }
    }

    #[inline]
    pub const fn vector_store(&self) -> &VectorStore {
        &self.vector_store
    }

    /// Embed `query` with the blocking Ollama client
    #[inline]
    pub fn embed_query(&self, query: &str) -> Result<Vec<f32>, SearchError> {
        self.ollama_client
            .generate_embedding(query)
            .map_err(|e| SearchError::Embedding(format!("{e:#}")))
    }

    /// Nearest chunks to an already embedded query, closest first
    #[inline]
    pub async fn search_vector(
        &self,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<QueryResult>, SearchError> {
        let chunks = self
            .vector_store
            .search(vector, limit)
            .await
            .map_err(|e| SearchError::Store(e.to_string()))?;

        debug!("Search returned {} chunks", chunks.len());
        Ok(chunks.into_iter().map(QueryResult::from).collect())
    }

    /// Embed `query` and return the `limit` nearest chunks, closest first
    #[inline]
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<QueryResult>, SearchError> {
        let vector = self.embed_query(query)?;
        self.search_vector(&vector, limit).await
    }
}
