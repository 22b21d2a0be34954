// Database module
// Chunk records and the LanceDB collection they are stored in

pub mod lancedb;

pub use self::lancedb::vector_store::{TABLE_NAME, VectorStore};
pub use self::lancedb::{ChunkRecord, StoredChunk};
