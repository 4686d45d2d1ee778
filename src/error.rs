//! Error taxonomy for the retrieval pipeline.
//!
//! Configuration and empty-input errors are fatal to the call that raised
//! them. [`RagError::NotFound`] from [`crate::retriever::Retriever::load_index`]
//! is the signal to rebuild the index from scratch. Extraction failures are
//! logged and isolated per file by the ingestion pipeline, so they only reach
//! callers of [`crate::ingest::Ingestor::extract`].

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("index not initialized: build or load an index first")]
    NotInitialized,

    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to extract {}: {message}", path.display())]
    Extraction { path: PathBuf, message: String },

    #[error("cannot build an index from zero chunks")]
    EmptyInput,

    #[error("query is empty")]
    EmptyQuery,

    #[error("embedding dimension mismatch: index has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    #[error("embedding backend failed: {0:#}")]
    Embedding(anyhow::Error),

    #[error("language model failed: {0:#}")]
    Model(anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl RagError {
    pub fn config(msg: impl Into<String>) -> Self {
        RagError::Configuration(msg.into())
    }

    /// True for the "index does not exist yet" condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RagError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_includes_path() {
        let err = RagError::NotFound(PathBuf::from("index_store/vectors.bin"));
        assert!(err.to_string().contains("index_store/vectors.bin"));
        assert!(err.is_not_found());
    }

    #[test]
    fn embedding_error_keeps_context_chain() {
        let inner = anyhow::anyhow!("connection refused").context("Ollama request failed");
        let err = RagError::Embedding(inner);
        let msg = err.to_string();
        assert!(msg.contains("Ollama request failed"));
        assert!(msg.contains("connection refused"));
        assert!(!err.is_not_found());
    }
}
