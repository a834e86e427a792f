use thiserror::Error;

pub type Result<T> = std::result::Result<T, SeekifyError>;

#[derive(Error, Debug)]
pub enum SeekifyError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// The search provider could not be reached or returned something unusable.
    /// Fatal for the whole pipeline run.
    #[error("Failed to fetch the results: {0}")]
    Discovery(String),

    /// A single page could not be fetched or parsed. Absorbed by the acquirer.
    #[error("Failed to acquire {url}: {message}")]
    Acquisition { url: String, message: String },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod config;
pub mod crawler;
pub mod database;
pub mod embeddings;
pub mod generation;
pub mod pipeline;
pub mod retrieval;
pub mod search;
