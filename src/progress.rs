//! Index build progress reporting.
//!
//! Reports what `lrag index` is doing (walking, extracting file n of total,
//! embedding, writing the index) so long builds are observable. Progress is
//! emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;

/// A single progress event during an index build.
#[derive(Clone, Debug, PartialEq)]
pub enum IndexProgressEvent {
    /// Walking the document tree. Total unknown.
    Discovering { root: PathBuf },
    /// File `n` of `total` is being extracted and chunked.
    Extracting { n: u64, total: u64 },
    /// `chunks` texts are being embedded, in batches of the index's batch size.
    Embedding { chunks: u64 },
    /// Index artifacts are being written.
    Persisting { path: PathBuf },
}

/// Receives progress events from the ingestion pipeline and retriever.
pub trait IndexProgressReporter {
    fn report(&self, event: IndexProgressEvent);
}

/// Human-friendly progress on stderr: "index  extracting  12 / 1,500 files".
pub struct StderrProgress;

impl IndexProgressReporter for StderrProgress {
    fn report(&self, event: IndexProgressEvent) {
        let line = match &event {
            IndexProgressEvent::Discovering { root } => {
                format!("index  discovering {}...\n", root.display())
            }
            IndexProgressEvent::Extracting { n, total } => format!(
                "index  extracting  {} / {} files\n",
                format_number(*n),
                format_number(*total)
            ),
            IndexProgressEvent::Embedding { chunks } => {
                format!("index  embedding  {} chunks\n", format_number(*chunks))
            }
            IndexProgressEvent::Persisting { path } => {
                format!("index  writing {}\n", path.display())
            }
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl IndexProgressReporter for JsonProgress {
    fn report(&self, event: IndexProgressEvent) {
        let obj = match &event {
            IndexProgressEvent::Discovering { root } => serde_json::json!({
                "event": "progress",
                "phase": "discovering",
                "root": root.display().to_string(),
            }),
            IndexProgressEvent::Extracting { n, total } => serde_json::json!({
                "event": "progress",
                "phase": "extracting",
                "n": n,
                "total": total,
            }),
            IndexProgressEvent::Embedding { chunks } => serde_json::json!({
                "event": "progress",
                "phase": "embedding",
                "chunks": chunks,
            }),
            IndexProgressEvent::Persisting { path } => serde_json::json!({
                "event": "progress",
                "phase": "persisting",
                "path": path.display().to_string(),
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

pub struct NoProgress;

impl IndexProgressReporter for NoProgress {
    fn report(&self, _event: IndexProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn IndexProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

impl FromStr for ProgressMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => Err(format!(
                "unknown progress mode '{}': expected off, human, or json",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234), "1,234");
        assert_eq!(format_number(123_456), "123,456");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn parses_progress_modes() {
        assert_eq!("json".parse::<ProgressMode>(), Ok(ProgressMode::Json));
        assert_eq!("off".parse::<ProgressMode>(), Ok(ProgressMode::Off));
        assert!("loud".parse::<ProgressMode>().is_err());
    }
}
