//! Ingestion plus vector index behind one query interface.

use std::path::Path;

use tracing::info;

use crate::embedding::{embed_query, Embedder};
use crate::error::{RagError, Result};
use crate::index::{IndexState, VectorIndex};
use crate::ingest::Ingestor;
use crate::progress::IndexProgressEvent;

pub const DEFAULT_TOP_K: usize = 5;

pub struct Retriever {
    ingestor: Ingestor,
    embedder: Box<dyn Embedder>,
    index: VectorIndex,
}

impl Retriever {
    pub fn new(ingestor: Ingestor, embedder: Box<dyn Embedder>) -> Self {
        Self {
            ingestor,
            embedder,
            index: VectorIndex::new(),
        }
    }

    pub fn with_index(mut self, index: VectorIndex) -> Self {
        self.index = index;
        self
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Rebuild the index from every document under `doc_root` and persist it
    /// to `save_path`. Returns the number of chunks indexed.
    pub fn index_documents(&mut self, doc_root: &Path, save_path: &Path) -> Result<usize> {
        let chunks = self.ingestor.ingest(doc_root)?;
        self.ingestor.report(IndexProgressEvent::Embedding {
            chunks: chunks.len() as u64,
        });
        self.index.build(chunks, self.embedder.as_ref())?;
        self.ingestor.report(IndexProgressEvent::Persisting {
            path: save_path.to_path_buf(),
        });
        self.index.persist(save_path)?;
        info!(
            documents = %doc_root.display(),
            index = %save_path.display(),
            chunks = self.index.len(),
            "Indexing complete"
        );
        Ok(self.index.len())
    }

    /// Load a persisted index. `Ok(false)` means there is no index at
    /// `save_path` yet; any other failure is returned as an error.
    pub fn load_index(&mut self, save_path: &Path) -> Result<bool> {
        match self.index.load(save_path) {
            Ok(loaded) => Ok(loaded),
            Err(RagError::NotFound(missing)) => {
                info!(missing = %missing.display(), "No persisted index");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Load the index at `save_path`, building it from `doc_root` if it does
    /// not exist yet.
    pub fn prepare(&mut self, doc_root: &Path, save_path: &Path) -> Result<()> {
        if self.load_index(save_path)? {
            return Ok(());
        }
        info!("Building a new index");
        self.index_documents(doc_root, save_path)?;
        Ok(())
    }

    /// The `top_k` chunks nearest to `query`.
    pub fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<String>> {
        if query.trim().is_empty() {
            return Err(RagError::EmptyQuery);
        }
        if self.index.state() == IndexState::Empty {
            return Err(RagError::NotInitialized);
        }
        let vector = embed_query(self.embedder.as_ref(), query)?;
        self.index.search(&vector, top_k)
    }
}
