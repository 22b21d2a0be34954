// Embeddings module
// Text embeddings are produced by a local Ollama server

pub mod ollama;

pub use ollama::{ModelInfo, OllamaClient};
