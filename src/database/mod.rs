// Database module
// On-disk vector index holding the chunks of the latest web search

pub mod vector_index;

pub use vector_index::{IndexConfig, IndexedVector, ScoredChunk, VectorIndex};
