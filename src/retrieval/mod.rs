// Retrieval module
// Top-K chunk texts for a question, most similar first


use tracing::debug;

use crate::Result;
use crate::database::VectorIndex;

pub const DEFAULT_TOP_K: usize = 10;

/// Retrieved chunk texts ranked by similarity to the question
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextSet {
    texts: Vec<String>,
}

impl ContextSet {
    #[inline]
    pub fn new(texts: Vec<String>) -> Self {
        Self { texts }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    #[inline]
    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    /// All texts joined with blank lines, in rank order
    #[inline]
    pub fn joined(&self) -> String {
        self.texts.join("\n\n")
    }
}

/// Queries a [`VectorIndex`] for the chunks closest to a question
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retriever {
    top_k: usize,
}

impl Default for Retriever {
    #[inline]
    fn default() -> Self {
        Self::new(DEFAULT_TOP_K)
    }
}

impl Retriever {
    #[inline]
    pub fn new(top_k: usize) -> Self {
        Self { top_k }
    }

    #[inline]
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Texts of the `top_k` closest chunks. An empty index gives an empty set.
    #[inline]
    pub async fn retrieve(&self, index: &VectorIndex, question: &str) -> Result<ContextSet> {
        let texts: Vec<String> = index
            .query(question, self.top_k)
            .await?
            .into_iter()
            .map(|scored| scored.chunk.text)
            .collect();

        debug!("Retrieved {} context chunks", texts.len());
        Ok(ContextSet::new(texts))
    }
}
