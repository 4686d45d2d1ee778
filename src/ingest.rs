//! Ingestion pipeline: directory walk → extraction → chunking.
//!
//! Walks every file under a root directory in sorted order, expands archives
//! into scoped temporary directories, extracts text through a
//! [`TextExtractor`], and chunks each non-empty text. Failures are isolated
//! per file: a bad document is logged and skipped, never fatal to the run.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::archive::ExpandedArchive;
use crate::chunk::{chunk_text, ChunkParams};
use crate::error::{RagError, Result};
use crate::extract::{panic_message, FileExtractor, TextExtractor};
use crate::models::{Document, DocumentFormat};
use crate::progress::{IndexProgressEvent, IndexProgressReporter, NoProgress};

/// How deep archives nested inside archives are expanded.
const MAX_ARCHIVE_DEPTH: usize = 4;

pub struct Ingestor {
    params: ChunkParams,
    extractor: Box<dyn TextExtractor>,
    excludes: GlobSet,
    follow_symlinks: bool,
    progress: Box<dyn IndexProgressReporter>,
}

impl Ingestor {
    pub fn new(params: ChunkParams) -> Self {
        Self {
            params,
            extractor: Box::new(FileExtractor),
            excludes: GlobSet::empty(),
            follow_symlinks: false,
            progress: Box::new(NoProgress),
        }
    }

    pub fn with_extractor(mut self, extractor: Box<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Skip files whose path relative to the walk root matches any pattern.
    pub fn with_excludes(mut self, patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| {
                RagError::config(format!("invalid exclude glob '{}': {}", pattern, e))
            })?;
            builder.add(glob);
        }
        self.excludes = builder
            .build()
            .map_err(|e| RagError::config(format!("invalid exclude globs: {}", e)))?;
        Ok(self)
    }

    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    pub fn with_progress(mut self, progress: Box<dyn IndexProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn params(&self) -> &ChunkParams {
        &self.params
    }

    /// Forward an event to this pipeline's progress reporter.
    pub fn report(&self, event: IndexProgressEvent) {
        self.progress.report(event);
    }

    /// Extract the text of a single file.
    ///
    /// Extractor failures, including panics inside third-party parsers, come
    /// back as [`RagError::Extraction`].
    pub fn extract(&self, path: &Path) -> Result<String> {
        let extracted = catch_unwind(AssertUnwindSafe(|| self.extractor.extract_text(path)));
        let message = match extracted {
            Ok(Ok(text)) => return Ok(text),
            Ok(Err(e)) => e.to_string(),
            Err(panic) => format!("extractor panicked: {}", panic_message(panic.as_ref())),
        };
        Err(RagError::Extraction {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Chunk every supported document under `root`, in walk order.
    ///
    /// Fails only when `root` itself is missing or not a directory.
    pub fn ingest(&self, root: &Path) -> Result<Vec<String>> {
        if !root.is_dir() {
            return Err(RagError::NotFound(root.to_path_buf()));
        }
        self.progress.report(IndexProgressEvent::Discovering {
            root: root.to_path_buf(),
        });

        let documents = self.discover(root);
        let total = documents.len() as u64;
        let mut chunks = Vec::new();
        for (i, document) in documents.iter().enumerate() {
            self.progress.report(IndexProgressEvent::Extracting {
                n: i as u64 + 1,
                total,
            });
            self.ingest_document(document, 0, &mut chunks);
        }

        info!(
            root = %root.display(),
            files = documents.len(),
            chunks = chunks.len(),
            "Ingestion finished"
        );
        Ok(chunks)
    }

    fn discover(&self, root: &Path) -> Vec<Document> {
        let walker = WalkDir::new(root)
            .follow_links(self.follow_symlinks)
            .sort_by_file_name();
        let mut documents = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            if self.excludes.is_match(relative) {
                debug!(path = %path.display(), "Excluded by glob");
                continue;
            }
            documents.push(Document::new(path));
        }
        documents
    }

    fn ingest_document(&self, document: &Document, depth: usize, out: &mut Vec<String>) {
        match document.format {
            DocumentFormat::Archive => self.ingest_archive(document, depth, out),
            DocumentFormat::Unsupported => {
                warn!(path = %document.path.display(), "Unsupported file type");
            }
            _ => {
                debug!(path = %document.path.display(), "Processing file");
                match self.extract(&document.path) {
                    Ok(text) if !text.is_empty() => {
                        out.extend(chunk_text(&text, &self.params));
                    }
                    Ok(_) => debug!(path = %document.path.display(), "No text extracted"),
                    Err(e) => warn!(error = %e, "Skipping file"),
                }
            }
        }
    }

    fn ingest_archive(&self, document: &Document, depth: usize, out: &mut Vec<String>) {
        if depth >= MAX_ARCHIVE_DEPTH {
            warn!(path = %document.path.display(), "Archive nested too deeply, skipping");
            return;
        }
        // The temporary directory lives until `expanded` drops at the end of
        // this call, whatever happens in between.
        let expanded = match ExpandedArchive::expand(&document.path) {
            Ok(expanded) => expanded,
            Err(e) => {
                error!(path = %document.path.display(), error = %e, "Could not create temporary directory");
                return;
            }
        };
        for file in expanded.files() {
            debug!(path = %file.display(), archive = %document.path.display(), "Processing extracted file");
            self.ingest_document(&Document::new(file), depth + 1, out);
        }
    }
}
