// Embeddings module
// Turns page text into chunks and chunks (or questions) into vectors

pub mod chunking;
pub mod ollama;

use std::sync::Arc;

use crate::{Result, SeekifyError};

pub use chunking::{Chunk, ChunkingConfig, RecursiveSplitter, chunk_page, normalized_url};
pub use ollama::OllamaClient;

/// A service that maps text to fixed-dimension vectors.
///
/// The same provider must be used for indexing and querying so that
/// similarities are comparable. Calls block; use [`embed_blocking`] from async code.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed every text, in order. Fails as a whole with
    /// [`SeekifyError::Embedding`]; partial results are never returned.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn model_name(&self) -> &str;
}

/// Run [`EmbeddingProvider::embed`] on a blocking thread
#[inline]
pub async fn embed_blocking(
    provider: &Arc<dyn EmbeddingProvider>,
    texts: Vec<String>,
) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let provider = Arc::clone(provider);
    tokio::task::spawn_blocking(move || provider.embed(&texts))
        .await
        .map_err(|e| SeekifyError::Embedding(format!("embedding task failed: {}", e)))?
}
