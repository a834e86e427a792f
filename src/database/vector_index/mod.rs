
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType, Table,
    query::{ExecutableQuery, QueryBase},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::embeddings::{Chunk, EmbeddingProvider, embed_blocking};
use crate::{Result, SeekifyError};

/// Configuration for the vector index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IndexConfig {
    /// Name of the collection (LanceDB table) chunks are stored in
    pub collection: String,
    /// Number of chunks retrieved per question
    pub top_k: usize,
}

impl Default for IndexConfig {
    #[inline]
    fn default() -> Self {
        Self {
            collection: "seekify".to_string(),
            top_k: 10,
        }
    }
}

/// A chunk together with its embedding, as stored in the index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedVector {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
    pub indexed_at: DateTime<Utc>,
}

/// A stored chunk and its cosine similarity to a query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Named on-disk collection of chunk embeddings keyed by chunk identity.
///
/// The table is created lazily from the dimension of the first embeddings
/// written and recreated when that dimension changes.
pub struct VectorIndex {
    connection: Connection,
    table_name: String,
    vector_dimension: Option<usize>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl VectorIndex {
    /// Open the collection stored under `path`, reusing it if it exists
    #[inline]
    pub async fn open(
        path: &Path,
        collection: &str,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        debug!("Opening vector index at {}", path.display());

        std::fs::create_dir_all(path).map_err(|e| {
            SeekifyError::Database(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = path.to_string_lossy().into_owned();

        let connection = match lancedb::connect(&uri).execute().await {
            Ok(connection) => connection,
            Err(e) => {
                error!("Failed to connect to LanceDB: {}", e);

                let message = e.to_string().to_lowercase();
                if !(message.contains("corrupt")
                    || message.contains("invalid")
                    || message.contains("malformed"))
                {
                    return Err(SeekifyError::Database(format!(
                        "Failed to connect to LanceDB: {}",
                        e
                    )));
                }

                warn!("Vector index corruption detected, starting from an empty index");
                Self::discard_corrupted(path)?;
                lancedb::connect(&uri).execute().await.map_err(|e| {
                    SeekifyError::Database(format!(
                        "Failed to connect to LanceDB after recovery: {}",
                        e
                    ))
                })?
            }
        };

        let mut index = Self {
            connection,
            table_name: collection.to_string(),
            vector_dimension: None,
            embedder,
        };

        if index.table_exists().await? {
            match index.detect_existing_vector_dimension().await {
                Ok(dimension) => {
                    info!(
                        "Reusing collection '{}' with {} dimensions",
                        index.table_name, dimension
                    );
                    index.vector_dimension = Some(dimension);
                }
                Err(e) => {
                    warn!("Unusable collection '{}', dropping it: {}", index.table_name, e);
                    index.drop_table_if_exists().await?;
                }
            }
        }

        Ok(index)
    }

    #[inline]
    pub fn collection(&self) -> &str {
        &self.table_name
    }

    /// Embed every chunk and write them in one merge keyed on chunk identity.
    ///
    /// Writing the same chunks again overwrites them. When embedding fails
    /// nothing is written.
    #[inline]
    pub async fn upsert(&mut self, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            debug!("No chunks to index");
            return Ok(());
        }

        let chunks = dedup_by_identity(chunks);
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = embed_blocking(&self.embedder, texts).await?;
        if vectors.len() != chunks.len() {
            return Err(SeekifyError::Embedding(format!(
                "expected {} embeddings, got {}",
                chunks.len(),
                vectors.len()
            )));
        }

        let indexed_at = Utc::now();
        let records: Vec<IndexedVector> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexedVector {
                chunk,
                vector,
                indexed_at,
            })
            .collect();

        let vector_dim = records.first().map_or(0, |record| record.vector.len());
        if vector_dim == 0 {
            return Err(SeekifyError::Embedding(
                "embedding service returned empty vectors".to_string(),
            ));
        }
        if self.vector_dimension != Some(vector_dim) {
            info!(
                "Vector dimension changed from {:?} to {}, recreating collection",
                self.vector_dimension, vector_dim
            );
            self.recreate_table_with_dimension(vector_dim).await?;
            self.vector_dimension = Some(vector_dim);
        }

        let record_batch = create_record_batch(&records, vector_dim)?;
        let table = self.open_table().await?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        let mut merge = table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge
            .execute(Box::new(reader))
            .await
            .map_err(|e| SeekifyError::Database(format!("Failed to upsert chunks: {}", e)))?;

        info!("Indexed {} chunks", records.len());
        Ok(())
    }

    /// Return up to `top_k` stored chunks most similar to `text`, closest first.
    ///
    /// An empty or missing collection yields an empty result without
    /// embedding `text`.
    #[inline]
    pub async fn query(&self, text: &str, top_k: usize) -> Result<Vec<ScoredChunk>> {
        if top_k == 0 || self.count().await? == 0 {
            debug!("Collection '{}' is empty", self.table_name);
            return Ok(Vec::new());
        }

        let query_vector = embed_blocking(&self.embedder, vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SeekifyError::Embedding("no embedding for query".to_string()))?;

        if self.vector_dimension != Some(query_vector.len()) {
            return Err(SeekifyError::Database(format!(
                "Query has {} dimensions but collection '{}' holds {:?}",
                query_vector.len(),
                self.table_name,
                self.vector_dimension
            )));
        }

        let table = self.open_table().await?;
        let results = table
            .vector_search(query_vector.as_slice())
            .map_err(|e| {
                SeekifyError::Database(format!("Failed to create vector search: {}", e))
            })?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(top_k)
            .execute()
            .await
            .map_err(|e| SeekifyError::Database(format!("Failed to execute search: {}", e)))?;

        let mut scored = parse_search_results_stream(results).await?;
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);

        debug!("Retrieved {} chunks for query", scored.len());
        Ok(scored)
    }

    /// Drop the whole collection
    #[inline]
    pub async fn clear(&mut self) -> Result<()> {
        self.drop_table_if_exists().await?;
        self.vector_dimension = None;
        info!("Cleared collection '{}'", self.table_name);
        Ok(())
    }

    /// Number of stored chunks
    #[inline]
    pub async fn count(&self) -> Result<usize> {
        if self.vector_dimension.is_none() {
            return Ok(0);
        }

        self.open_table()
            .await?
            .count_rows(None)
            .await
            .map_err(|e| SeekifyError::Database(format!("Failed to count rows: {}", e)))
    }

    async fn open_table(&self) -> Result<Table> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| SeekifyError::Database(format!("Failed to open table: {}", e)))
    }

    async fn table_exists(&self) -> Result<bool> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| SeekifyError::Database(format!("Failed to list tables: {}", e)))?;

        Ok(table_names.contains(&self.table_name))
    }

    async fn detect_existing_vector_dimension(&self) -> Result<usize> {
        let schema = self
            .open_table()
            .await?
            .schema()
            .await
            .map_err(|e| SeekifyError::Database(format!("Failed to get table schema: {}", e)))?;

        match schema.field_with_name("vector").map(Field::data_type) {
            Ok(DataType::FixedSizeList(_, size)) if *size > 0 => Ok(*size as usize),
            _ => Err(SeekifyError::Database(
                "Could not find vector column or determine dimension".to_string(),
            )),
        }
    }

    async fn recreate_table_with_dimension(&self, vector_dim: usize) -> Result<()> {
        self.drop_table_if_exists().await?;

        self.connection
            .create_empty_table(&self.table_name, create_schema(vector_dim))
            .execute()
            .await
            .map_err(|e| {
                SeekifyError::Database(format!("Failed to create table with new dimensions: {}", e))
            })?;

        debug!(
            "Created collection '{}' with {} dimensions",
            self.table_name, vector_dim
        );
        Ok(())
    }

    async fn drop_table_if_exists(&self) -> Result<()> {
        if self.table_exists().await? {
            debug!("Dropping collection '{}'", self.table_name);
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| SeekifyError::Database(format!("Failed to drop table: {}", e)))?;
        }

        Ok(())
    }

    fn discard_corrupted(path: &Path) -> Result<()> {
        let backup_path = path.with_extension("corrupted_backup");
        match std::fs::rename(path, &backup_path) {
            Ok(()) => info!("Corrupted index moved to {}", backup_path.display()),
            Err(e) => {
                error!("Failed to back up corrupted index: {}", e);
                std::fs::remove_dir_all(path).map_err(|e| {
                    SeekifyError::Database(format!("Failed to remove corrupted index: {}", e))
                })?;
            }
        }

        std::fs::create_dir_all(path).map_err(|e| {
            SeekifyError::Database(format!("Failed to recreate vector database directory: {}", e))
        })
    }
}

fn create_schema(vector_dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                vector_dim as i32,
            ),
            false,
        ),
        Field::new("text", DataType::Utf8, false),
        Field::new("source", DataType::Utf8, false),
        Field::new("sequence_index", DataType::UInt64, false),
        Field::new("indexed_at", DataType::Utf8, false),
    ]))
}

/// Collapse chunks sharing an identity, the later one taking the slot of the
/// first. `merge_insert` needs unique keys in its source.
fn dedup_by_identity(chunks: &[Chunk]) -> Vec<Chunk> {
    let mut slots: HashMap<String, usize> = HashMap::with_capacity(chunks.len());
    let mut unique: Vec<Chunk> = Vec::with_capacity(chunks.len());

    for chunk in chunks {
        match slots.get(&chunk.id()) {
            Some(&slot) => {
                debug!("Chunk identity {} repeated in batch, keeping the later one", chunk.id());
                unique[slot] = chunk.clone();
            }
            None => {
                slots.insert(chunk.id(), unique.len());
                unique.push(chunk.clone());
            }
        }
    }

    unique
}

fn create_record_batch(records: &[IndexedVector], vector_dim: usize) -> Result<RecordBatch> {
    let len = records.len();

    let mut ids = Vec::with_capacity(len);
    let mut flat_values = Vec::with_capacity(len * vector_dim);
    let mut texts = Vec::with_capacity(len);
    let mut sources = Vec::with_capacity(len);
    let mut sequence_indices = Vec::with_capacity(len);
    let mut indexed_ats = Vec::with_capacity(len);

    for record in records {
        if record.vector.len() != vector_dim {
            return Err(SeekifyError::Embedding(format!(
                "embedding for {} has {} dimensions, expected {}",
                record.chunk.id(),
                record.vector.len(),
                vector_dim
            )));
        }

        ids.push(record.chunk.id());
        flat_values.extend_from_slice(&record.vector);
        texts.push(record.chunk.text.as_str());
        sources.push(record.chunk.source_url.as_str());
        sequence_indices.push(record.chunk.sequence_index as u64);
        indexed_ats.push(record.indexed_at.to_rfc3339());
    }

    let field = Arc::new(Field::new("item", DataType::Float32, false));
    let vector_array = FixedSizeListArray::try_new(
        field,
        vector_dim as i32,
        Arc::new(Float32Array::from(flat_values)),
        None,
    )
    .map_err(|e| SeekifyError::Database(format!("Failed to create vector array: {}", e)))?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(vector_array),
        Arc::new(StringArray::from(texts)),
        Arc::new(StringArray::from(sources)),
        Arc::new(UInt64Array::from(sequence_indices)),
        Arc::new(StringArray::from(indexed_ats)),
    ];

    RecordBatch::try_new(create_schema(vector_dim), arrays)
        .map_err(|e| SeekifyError::Database(format!("Failed to create record batch: {}", e)))
}

async fn parse_search_results_stream(
    mut results: lancedb::arrow::SendableRecordBatchStream,
) -> Result<Vec<ScoredChunk>> {
    let mut scored = Vec::new();

    while let Some(batch) = results
        .try_next()
        .await
        .map_err(|e| SeekifyError::Database(format!("Failed to read result stream: {}", e)))?
    {
        scored.extend(parse_search_batch(&batch)?);
    }

    Ok(scored)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| SeekifyError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| SeekifyError::Database(format!("Invalid {} column type", name)))
}

fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<ScoredChunk>> {
    let texts = string_column(batch, "text")?;
    let sources = string_column(batch, "source")?;
    let sequence_indices = batch
        .column_by_name("sequence_index")
        .ok_or_else(|| SeekifyError::Database("Missing sequence_index column".to_string()))?
        .as_any()
        .downcast_ref::<UInt64Array>()
        .ok_or_else(|| SeekifyError::Database("Invalid sequence_index column type".to_string()))?;
    let distances = batch
        .column_by_name("_distance")
        .and_then(|column| column.as_any().downcast_ref::<Float32Array>());

    (0..batch.num_rows())
        .map(|row| {
            let source_url = Url::parse(sources.value(row)).map_err(|e| {
                SeekifyError::Database(format!(
                    "Invalid source URL '{}': {}",
                    sources.value(row),
                    e
                ))
            })?;

            let distance = distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

            Ok(ScoredChunk {
                chunk: Chunk {
                    text: texts.value(row).to_string(),
                    source_url,
                    sequence_index: sequence_indices.value(row) as usize,
                },
                score: 1.0 - distance,
            })
        })
        .collect()
}
