//! Core data models used throughout the pipeline.
//!
//! Documents are discovered during ingestion and never mutated. Chunks are
//! plain strings whose position in the index is their identity. A [`History`]
//! is an ordered list of [`ConversationTurn`]s owned by the caller and passed
//! explicitly into each chat turn.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Format marker derived from a file's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Image,
    SlideDeck,
    WordProcessor,
    Spreadsheet,
    Archive,
    PlainText,
    Unsupported,
}

impl DocumentFormat {
    /// Classify a path by its (case-insensitive) extension.
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if name.ends_with(".tar.gz") {
            return DocumentFormat::Archive;
        }
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => DocumentFormat::Pdf,
            "jpg" | "jpeg" | "png" | "bmp" | "tiff" => DocumentFormat::Image,
            "pptx" | "ppt" => DocumentFormat::SlideDeck,
            "docx" | "doc" => DocumentFormat::WordProcessor,
            "xlsx" | "xls" => DocumentFormat::Spreadsheet,
            "zip" | "tar" | "tgz" | "gz" => DocumentFormat::Archive,
            "txt" | "md" | "rst" => DocumentFormat::PlainText,
            _ => DocumentFormat::Unsupported,
        }
    }
}

/// A file discovered during a directory walk.
#[derive(Debug, Clone)]
pub struct Document {
    pub path: PathBuf,
    pub format: DocumentFormat,
}

impl Document {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = DocumentFormat::from_path(&path);
        Self { path, format }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub message: String,
}

impl ConversationTurn {
    pub fn new(role: Role, message: impl Into<String>) -> Self {
        Self {
            role,
            message: message.into(),
        }
    }
}

/// Ordered conversation turns. Only grows, one full exchange at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    turns: Vec<ConversationTurn>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Returns a new history with the `(user, assistant)` pair appended.
    pub fn with_exchange(&self, user: &str, assistant: &str) -> History {
        let mut turns = self.turns.clone();
        turns.push(ConversationTurn::new(Role::User, user));
        turns.push(ConversationTurn::new(Role::Assistant, assistant));
        History { turns }
    }
}

impl From<Vec<ConversationTurn>> for History {
    fn from(turns: Vec<ConversationTurn>) -> Self {
        Self { turns }
    }
}
