// Question answering pipeline
// discover -> robots -> acquire -> chunk -> upsert -> retrieve -> clear -> generate

#[cfg(test)]
mod tests;

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::crawler::ContentAcquirer;
use crate::crawler::robots::RobotsGate;
use crate::database::VectorIndex;
use crate::embeddings::{Chunk, EmbeddingProvider, OllamaClient, RecursiveSplitter, chunk_page};
use crate::generation::{AnswerStream, Generator};
use crate::retrieval::{ContextSet, Retriever};
use crate::search::ResultDiscovery;
use crate::{Result, SeekifyError};

/// Answer given when a web search leaves no URL to fetch
pub const NO_RESULTS_ANSWER: &str = "No results found.";

/// Owns every component and the vector index for one session
pub struct Pipeline {
    discovery: ResultDiscovery,
    max_results: usize,
    robots: RobotsGate,
    acquirer: ContentAcquirer,
    splitter: RecursiveSplitter,
    index: VectorIndex,
    retriever: Retriever,
    generator: Generator,
}

impl Pipeline {
    /// Build the pipeline and open (or create) the configured collection
    #[inline]
    pub async fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(
            OllamaClient::new(&config.ollama)
                .map_err(|e| SeekifyError::Config(format!("{:#}", e)))?,
        );
        let index = VectorIndex::open(
            &config.vector_database_path(),
            &config.index.collection,
            embedder,
        )
        .await?;

        let acquirer = ContentAcquirer::new(config.crawler.clone());
        let robots = RobotsGate::new(acquirer.http_client().clone());

        Ok(Self {
            discovery: ResultDiscovery::from_config(&config.search)?,
            max_results: config.search.max_results,
            robots,
            acquirer,
            splitter: RecursiveSplitter::new(&config.chunking),
            index,
            retriever: Retriever::new(config.index.top_k),
            generator: Generator::new(&config.ollama)?,
        })
    }

    #[inline]
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Answer `question` from the web when `web_search_enabled`, otherwise
    /// from whatever the index currently holds.
    ///
    /// A web search pass leaves the index empty once retrieval is done.
    /// Search failures abort the run with [`SeekifyError::Discovery`].
    #[inline]
    pub async fn answer(
        &mut self,
        question: &str,
        web_search_enabled: bool,
    ) -> Result<AnswerStream> {
        if !web_search_enabled {
            let context = self.retriever.retrieve(&self.index, question).await?;
            return self.generator.generate(question, &context, true);
        }

        let indexed = self.search_and_index(question).await?;
        if indexed.is_none() {
            return Ok(AnswerStream::from_fragments([NO_RESULTS_ANSWER]));
        }

        let retrieved = self.retriever.retrieve(&self.index, question).await;
        self.index.clear().await?;
        let context: ContextSet = retrieved?;

        info!("Answering from {} context chunks", context.len());
        self.generator.generate(question, &context, true)
    }

    /// Answer from the model alone, with no retrieval or instruction
    #[inline]
    pub fn answer_ungrounded(&self, question: &str) -> Result<AnswerStream> {
        self.generator
            .generate(question, &ContextSet::default(), false)
    }

    /// Drop everything in the index
    #[inline]
    pub async fn clear(&mut self) -> Result<()> {
        self.index.clear().await
    }

    /// Run discovery through upsert. `None` means no URL survived discovery
    /// and robots filtering; otherwise the number of chunks indexed.
    async fn search_and_index(&mut self, question: &str) -> Result<Option<usize>> {
        let candidates = self.discovery.discover(question, self.max_results).await?;
        let allowed = self.robots.filter(&candidates).await;
        if allowed.is_empty() {
            warn!("No fetchable URLs for: {}", question);
            return Ok(None);
        }

        let pages = self.acquirer.acquire(&allowed, question).await;
        let chunks: Vec<Chunk> = pages
            .iter()
            .flat_map(|page| chunk_page(page, &self.splitter))
            .collect();

        info!(
            "Indexing {} chunks from {} of {} pages",
            chunks.len(),
            pages.len(),
            allowed.len()
        );
        self.index.upsert(&chunks).await?;

        Ok(Some(chunks.len()))
    }
}
