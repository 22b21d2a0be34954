
use super::{ChunkRecord, StoredChunk};
use crate::layout::Rect;
use crate::{RagError, config::Config};
use arrow::array::{
    Array, ArrayRef, FixedSizeListArray, Float32Array, ListArray, ListBuilder, RecordBatchIterator,
    StringArray, StringBuilder, UInt32Array, UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType, Table,
    query::{ExecutableQuery, QueryBase},
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name of the LanceDB table holding all chunks
pub const TABLE_NAME: &str = "pdf_chunks";

/// Vector database store using LanceDB for similarity search
pub struct VectorStore {
    connection: Connection,
    table_name: String,
    vector_dimension: Option<usize>,
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("table_name", &self.table_name)
            .field("vector_dimension", &self.vector_dimension)
            .finish_non_exhaustive()
    }
}

impl VectorStore {
    /// Connect to the vector database in the data directory.
    ///
    /// The table itself is created on the first insert, once the embedding
    /// dimension is known.
    #[inline]
    pub async fn new(config: &Config) -> Result<Self, RagError> {
        let db_path = config.vector_database_path();
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(&db_path).map_err(|e| {
            RagError::Database(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to connect to LanceDB: {}", e)))?;

        let mut store = Self {
            connection,
            table_name: TABLE_NAME.to_string(),
            vector_dimension: None,
        };

        if store.table_exists().await? {
            let dimension = store.detect_existing_vector_dimension().await?;
            info!("Detected existing vector dimension: {}", dimension);
            store.vector_dimension = Some(dimension);
        }

        debug!("Vector store initialized");
        Ok(store)
    }

    /// Dimension of the stored vectors, once known
    #[inline]
    pub const fn vector_dimension(&self) -> Option<usize> {
        self.vector_dimension
    }

    async fn table_exists(&self) -> Result<bool, RagError> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to list tables: {}", e)))?;
        Ok(table_names.contains(&self.table_name))
    }

    async fn open_table(&self) -> Result<Table, RagError> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to open table: {}", e)))
    }

    /// Detect vector dimension from existing table schema
    async fn detect_existing_vector_dimension(&self) -> Result<usize, RagError> {
        let table = self.open_table().await?;
        Self::table_vector_dimension(&table).await
    }

    async fn table_vector_dimension(table: &Table) -> Result<usize, RagError> {
        let schema = table
            .schema()
            .await
            .map_err(|e| RagError::Database(format!("Failed to get table schema: {}", e)))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return usize::try_from(*size).map_err(|_| {
                        RagError::Database(format!("Invalid vector dimension: {}", size))
                    });
                }
            }
        }

        Err(RagError::Database(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    /// Create schema with the specified vector dimension
    fn create_schema(vector_dim: i32) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::UInt64, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    vector_dim,
                ),
                false,
            ),
            Field::new("text", DataType::Utf8, false),
            Field::new("page", DataType::UInt32, false),
            Field::new("bbox_x0", DataType::Float32, true),
            Field::new("bbox_y0", DataType::Float32, true),
            Field::new("bbox_x1", DataType::Float32, true),
            Field::new("bbox_y1", DataType::Float32, true),
            Field::new(
                "images",
                DataType::List(Arc::new(Field::new("item", DataType::Utf8, true))),
                false,
            ),
            Field::new("indexed_at", DataType::Utf8, false),
        ]))
    }

    /// Drop the whole collection
    #[inline]
    pub async fn reset(&mut self) -> Result<(), RagError> {
        if self.table_exists().await? {
            info!("Dropping table {}", self.table_name);
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| RagError::Database(format!("Failed to drop table: {}", e)))?;
        }
        self.vector_dimension = None;
        Ok(())
    }

    /// Identifier for the next inserted chunk
    #[inline]
    pub async fn next_id(&self) -> Result<u64, RagError> {
        self.count().await
    }

    /// Number of stored chunks, 0 when nothing was ever stored
    #[inline]
    pub async fn count(&self) -> Result<u64, RagError> {
        if !self.table_exists().await? {
            return Ok(0);
        }

        let table = self.open_table().await?;
        let count = table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))?;

        Ok(count as u64)
    }

    /// Append chunks to the collection.
    ///
    /// The first insert creates the table with the dimension of the first
    /// record; every record must match that dimension afterwards.
    #[inline]
    pub async fn add_chunks(&mut self, records: &[ChunkRecord]) -> Result<(), RagError> {
        let Some(first) = records.first() else {
            debug!("No chunks to store");
            return Ok(());
        };

        let vector_dim = self.vector_dimension.unwrap_or(first.vector.len());
        if vector_dim == 0 {
            return Err(RagError::Database("Cannot store empty vectors".to_string()));
        }
        if let Some(record) = records.iter().find(|r| r.vector.len() != vector_dim) {
            return Err(RagError::Database(format!(
                "Vector dimension mismatch for chunk {}: expected {}, got {}",
                record.id,
                vector_dim,
                record.vector.len()
            )));
        }

        let record_batch = Self::create_record_batch(records, vector_dim)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        if self.table_exists().await? {
            let table = self.open_table().await?;
            table
                .add(reader)
                .execute()
                .await
                .map_err(|e| RagError::Database(format!("Failed to insert chunks: {}", e)))?;
        } else {
            info!(
                "Creating table {} with {} dimensions",
                self.table_name, vector_dim
            );
            self.connection
                .create_table(&self.table_name, reader)
                .execute()
                .await
                .map_err(|e| RagError::Database(format!("Failed to create table: {}", e)))?;
        }

        self.vector_dimension = Some(vector_dim);
        debug!("Stored {} chunks", records.len());
        Ok(())
    }

    /// Create a RecordBatch from chunk records
    fn create_record_batch(
        records: &[ChunkRecord],
        vector_dim: usize,
    ) -> Result<RecordBatch, RagError> {
        let list_size = i32::try_from(vector_dim)
            .map_err(|_| RagError::Database(format!("Vector dimension too large: {}", vector_dim)))?;
        let len = records.len();

        let mut flat_values = Vec::with_capacity(len * vector_dim);
        let mut bbox_columns: [Vec<Option<f32>>; 4] = Default::default();
        let mut images = ListBuilder::new(StringBuilder::new());

        for record in records {
            flat_values.extend_from_slice(&record.vector);

            let corners = record.bbox.map(<[f32; 4]>::from);
            for (column, value) in bbox_columns.iter_mut().enumerate() {
                value.push(corners.map(|c| c[column]));
            }

            for path in &record.images {
                images.values().append_value(path);
            }
            images.append(true);
        }

        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            list_size,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| RagError::Database(format!("Failed to create vector array: {}", e)))?;

        let [x0, y0, x1, y1] = bbox_columns;
        let arrays: Vec<ArrayRef> = vec![
            Arc::new(UInt64Array::from_iter_values(records.iter().map(|r| r.id))),
            Arc::new(vector_array),
            Arc::new(StringArray::from_iter_values(
                records.iter().map(|r| r.text.as_str()),
            )),
            Arc::new(UInt32Array::from_iter_values(records.iter().map(|r| r.page))),
            Arc::new(Float32Array::from(x0)),
            Arc::new(Float32Array::from(y0)),
            Arc::new(Float32Array::from(x1)),
            Arc::new(Float32Array::from(y1)),
            Arc::new(images.finish()),
            Arc::new(StringArray::from_iter_values(
                records.iter().map(|r| r.indexed_at.as_str()),
            )),
        ];

        RecordBatch::try_new(Self::create_schema(list_size), arrays)
            .map_err(|e| RagError::Database(format!("Failed to create record batch: {}", e)))
    }

    /// Nearest stored chunks to `query_vector` by L2 distance, closest first
    #[inline]
    pub async fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<StoredChunk>, RagError> {
        debug!("Searching for similar vectors with limit: {}", limit);

        if !self.table_exists().await? {
            warn!("Search on empty collection");
            return Ok(Vec::new());
        }

        // Another process may have rebuilt the table with a different model
        let table = self.open_table().await?;
        let dimension = Self::table_vector_dimension(&table).await?;
        if dimension != query_vector.len() {
            return Err(RagError::Database(format!(
                "Query vector has {} dimensions, collection has {}",
                query_vector.len(),
                dimension
            )));
        }
        if self.vector_dimension.is_some_and(|cached| cached != dimension) {
            info!("Collection dimension changed to {}", dimension);
        }

        let results = table
            .vector_search(query_vector)
            .map_err(|e| RagError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::L2)
            .limit(limit)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to execute search: {}", e)))?;

        let mut chunks = Self::parse_results_stream(results).await?;
        chunks.sort_by(|a, b| {
            a.distance
                .unwrap_or(f32::MAX)
                .total_cmp(&b.distance.unwrap_or(f32::MAX))
        });
        Ok(chunks)
    }

    /// Up to `limit` stored chunks in id order
    #[inline]
    pub async fn peek(&self, limit: usize) -> Result<Vec<StoredChunk>, RagError> {
        if !self.table_exists().await? {
            return Ok(Vec::new());
        }

        let table = self.open_table().await?;
        let results = table
            .query()
            .limit(limit)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to query table: {}", e)))?;

        let mut chunks = Self::parse_results_stream(results).await?;
        chunks.sort_by_key(|chunk| chunk.id);
        Ok(chunks)
    }

    /// Parse a LanceDB result stream into stored chunks
    async fn parse_results_stream(
        mut results: lancedb::arrow::SendableRecordBatchStream,
    ) -> Result<Vec<StoredChunk>, RagError> {
        let mut chunks = Vec::new();

        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| RagError::Database(format!("Failed to read result stream: {}", e)))?
        {
            chunks.extend(Self::parse_batch(&batch)?);
        }

        debug!("Parsed {} chunks from stream", chunks.len());
        Ok(chunks)
    }

    fn parse_batch(batch: &RecordBatch) -> Result<Vec<StoredChunk>, RagError> {
        let ids = column::<UInt64Array>(batch, "id")?;
        let texts = column::<StringArray>(batch, "text")?;
        let pages = column::<UInt32Array>(batch, "page")?;
        let x0 = column::<Float32Array>(batch, "bbox_x0")?;
        let y0 = column::<Float32Array>(batch, "bbox_y0")?;
        let x1 = column::<Float32Array>(batch, "bbox_x1")?;
        let y1 = column::<Float32Array>(batch, "bbox_y1")?;
        let images = column::<ListArray>(batch, "images")?;
        let indexed_ats = column::<StringArray>(batch, "indexed_at")?;

        let distances = batch
            .column_by_name("_distance")
            .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

        let mut chunks = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            let bbox = if [x0, y0, x1, y1].iter().any(|c| c.is_null(row)) {
                None
            } else {
                Some(Rect::new(
                    x0.value(row),
                    y0.value(row),
                    x1.value(row),
                    y1.value(row),
                ))
            };

            let row_images = images.value(row);
            let row_images = row_images
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| RagError::Database("Invalid images column type".to_string()))?;

            chunks.push(StoredChunk {
                id: ids.value(row),
                text: texts.value(row).to_string(),
                page: pages.value(row),
                bbox,
                images: row_images
                    .iter()
                    .flatten()
                    .map(str::to_string)
                    .collect(),
                indexed_at: indexed_ats.value(row).to_string(),
                distance: distances.and_then(|d| (!d.is_null(row)).then(|| d.value(row))),
            });
        }

        Ok(chunks)
    }
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T, RagError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| RagError::Database(format!("Invalid {} column type", name)))
}
