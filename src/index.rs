//! Flat L2 vector index with companion chunk texts.
//!
//! The index owns two parallel sequences: the embedding vectors and the chunk
//! texts they were computed from. Position `i` in one always corresponds to
//! position `i` in the other; both are replaced together by [`VectorIndex::build`]
//! or [`VectorIndex::load`] and never updated independently.
//!
//! # State machine
//!
//! ```text
//! Empty ──build──▶ Built ──persist──▶ Persisted
//!   │                                    ▲  │
//!   └──load──▶ Loaded ──persist──────────┘  └─persist (overwrite)
//! ```
//!
//! # On-disk layout
//!
//! A directory holding exactly two artifacts:
//!
//! | File | Contents |
//! |------|----------|
//! | `vectors.bin` | `LRAGIDX1`, u32 LE dim, u64 LE count, then `count × dim` LE f32 |
//! | `chunks.json` | JSON array of chunk strings, same order |

use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::embedding::{embed_batched, Embedder};
use crate::error::{RagError, Result};

pub const VECTORS_FILE: &str = "vectors.bin";
pub const CHUNKS_FILE: &str = "chunks.json";

const MAGIC: &[u8; 8] = b"LRAGIDX1";
const HEADER_LEN: usize = 8 + 4 + 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Empty,
    Built,
    Loaded,
    Persisted,
}

/// Row-major storage of equal-length vectors, searched exhaustively.
#[derive(Debug, Clone, Default, PartialEq)]
struct FlatL2 {
    dim: usize,
    data: Vec<f32>,
}

impl FlatL2 {
    fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    fn vector(&self, i: usize) -> &[f32] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }

    /// Indices of the `k` nearest vectors by ascending squared L2 distance.
    /// Equal distances keep insertion order.
    fn nearest(&self, query: &[f32], k: usize) -> Vec<usize> {
        let mut scored: Vec<(usize, f32)> = (0..self.len())
            .map(|i| (i, squared_l2(self.vector(i), query)))
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.into_iter().take(k).map(|(i, _)| i).collect()
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

pub struct VectorIndex {
    state: IndexState,
    vectors: FlatL2,
    texts: Vec<String>,
    batch_size: usize,
}

impl Default for VectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorIndex {
    pub fn new() -> Self {
        Self {
            state: IndexState::Empty,
            vectors: FlatL2::default(),
            texts: Vec::new(),
            batch_size: usize::MAX,
        }
    }

    /// Embed in batches of at most `batch_size` texts instead of one call.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn state(&self) -> IndexState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.vectors.dim
    }

    /// Embed `chunks` and replace the index contents with them.
    ///
    /// The dimension is taken from the first vector; every other vector must
    /// match it. On error the index is left as it was.
    pub fn build(&mut self, chunks: Vec<String>, embedder: &dyn Embedder) -> Result<()> {
        if chunks.is_empty() {
            return Err(RagError::EmptyInput);
        }

        let embeddings = embed_batched(embedder, &chunks, self.batch_size)?;
        let dim = embeddings.first().map(Vec::len).unwrap_or(0);
        if dim == 0 {
            return Err(RagError::Embedding(anyhow::anyhow!(
                "{} produced zero-length vectors",
                embedder.model_name()
            )));
        }

        let mut data = Vec::with_capacity(dim * embeddings.len());
        for vector in &embeddings {
            if vector.len() != dim {
                return Err(RagError::DimensionMismatch {
                    expected: dim,
                    actual: vector.len(),
                });
            }
            data.extend_from_slice(vector);
        }

        self.vectors = FlatL2 { dim, data };
        self.texts = chunks;
        self.state = IndexState::Built;
        info!(chunks = self.texts.len(), dim, "Index built");
        Ok(())
    }

    /// Write both artifacts under `path`, creating it if needed.
    pub fn persist(&mut self, path: &Path) -> Result<()> {
        if self.state == IndexState::Empty {
            return Err(RagError::NotInitialized);
        }
        fs::create_dir_all(path)?;
        fs::write(path.join(VECTORS_FILE), encode_vectors(&self.vectors))?;
        fs::write(path.join(CHUNKS_FILE), serde_json::to_vec(&self.texts)?)?;
        self.state = IndexState::Persisted;
        info!(path = %path.display(), chunks = self.texts.len(), "Index persisted");
        Ok(())
    }

    /// Restore both artifacts from `path`.
    ///
    /// Fails with [`RagError::NotFound`] if either file is missing and with
    /// [`RagError::CorruptIndex`] if they disagree. The index is unchanged on
    /// failure.
    pub fn load(&mut self, path: &Path) -> Result<bool> {
        let vectors_path = path.join(VECTORS_FILE);
        let chunks_path = path.join(CHUNKS_FILE);
        for required in [&vectors_path, &chunks_path] {
            if !required.is_file() {
                return Err(RagError::NotFound(required.clone()));
            }
        }

        let vectors = decode_vectors(&fs::read(&vectors_path)?)?;
        let texts: Vec<String> = serde_json::from_slice(&fs::read(&chunks_path)?)
            .map_err(|e| RagError::CorruptIndex(format!("{}: {}", CHUNKS_FILE, e)))?;
        if vectors.len() != texts.len() {
            return Err(RagError::CorruptIndex(format!(
                "{} holds {} vectors but {} holds {} chunks",
                VECTORS_FILE,
                vectors.len(),
                CHUNKS_FILE,
                texts.len()
            )));
        }

        self.vectors = vectors;
        self.texts = texts;
        self.state = IndexState::Loaded;
        debug!(path = %path.display(), chunks = self.texts.len(), "Index loaded");
        Ok(true)
    }

    /// The `k` chunk texts nearest to `query`, closest first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<String>> {
        if self.state == IndexState::Empty {
            return Err(RagError::NotInitialized);
        }
        if query.len() != self.vectors.dim {
            return Err(RagError::DimensionMismatch {
                expected: self.vectors.dim,
                actual: query.len(),
            });
        }
        Ok(self
            .vectors
            .nearest(query, k)
            .into_iter()
            .map(|i| self.texts[i].clone())
            .collect())
    }
}

fn encode_vectors(vectors: &FlatL2) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + vectors.data.len() * 4);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&(vectors.dim as u32).to_le_bytes());
    bytes.extend_from_slice(&(vectors.len() as u64).to_le_bytes());
    for &v in &vectors.data {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

fn decode_vectors(bytes: &[u8]) -> Result<FlatL2> {
    if bytes.len() < HEADER_LEN || &bytes[..8] != MAGIC {
        return Err(RagError::CorruptIndex(format!(
            "{} has no valid header",
            VECTORS_FILE
        )));
    }
    let dim = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&bytes[12..HEADER_LEN]);
    let count = u64::from_le_bytes(count_bytes) as usize;

    let body = &bytes[HEADER_LEN..];
    let expected = dim
        .checked_mul(count)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| RagError::CorruptIndex(format!("{} header overflows", VECTORS_FILE)))?;
    if dim == 0 || body.len() != expected {
        return Err(RagError::CorruptIndex(format!(
            "{} declares {} × {} floats but holds {} bytes",
            VECTORS_FILE,
            count,
            dim,
            body.len()
        )));
    }

    let data = body
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Ok(FlatL2 { dim, data })
}
