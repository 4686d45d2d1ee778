//! Append-only JSON log of completed exchanges.
//!
//! The file holds a single JSON array of `{timestamp, user, assistant}`
//! records. A missing or unparseable file starts a fresh array.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub user: String,
    pub assistant: String,
}

#[derive(Debug, Clone)]
pub struct ConversationLog {
    path: PathBuf,
}

impl ConversationLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        let Ok(bytes) = fs::read(&self.path) else {
            return Vec::new();
        };
        match serde_json::from_slice(&bytes) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Conversation log unreadable, starting a new one");
                Vec::new()
            }
        }
    }

    pub fn append(&self, user: &str, assistant: &str) -> Result<()> {
        let mut entries = self.entries();
        entries.push(LogEntry {
            timestamp: Utc::now(),
            user: user.to_string(),
            assistant: assistant.to_string(),
        });
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_vec_pretty(&entries)?)?;
        Ok(())
    }
}
