//! Text extraction for individual documents, keyed by file extension.
//!
//! [`TextExtractor`] is the seam the ingestion pipeline calls through;
//! [`FileExtractor`] is the built-in implementation:
//!
//! | Extension | Strategy |
//! |-----------|----------|
//! | `.txt` `.md` `.rst` | read as UTF-8 (lossy) |
//! | `.pdf` | `pdf-extract` |
//! | `.docx` | `word/document.xml` `<w:t>` runs, one line per paragraph |
//! | `.pptx` | `ppt/slides/slideN.xml` `<a:t>` runs, one line per paragraph |
//! | `.xlsx` | worksheet cells resolved through `xl/sharedStrings.xml`, one line per row |
//!
//! Legacy binary Office formats and images (which would need OCR) are
//! reported as [`ExtractError::Unsupported`]; the pipeline logs and skips them.

use std::any::Any;
use std::io::Read;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

/// Maximum decompressed bytes read from a single OOXML part.
const MAX_PART_BYTES: u64 = 50 * 1024 * 1024;
/// Upper bound on worksheets read from one workbook.
const MAX_SHEETS: usize = 100;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported document type: {0}")]
    Unsupported(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
}

/// Pulls plain text out of a single file.
///
/// Implementations may fail per file; callers are expected to log the
/// failure and carry on with the rest of the corpus.
pub trait TextExtractor {
    fn extract_text(&self, path: &Path) -> Result<String, ExtractError>;
}

/// Built-in extractor for plain text, PDF, and OOXML documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileExtractor;

impl TextExtractor for FileExtractor {
    fn extract_text(&self, path: &Path) -> Result<String, ExtractError> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "txt" | "md" | "rst" => {
                let bytes = std::fs::read(path)?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
            "pdf" => {
                let bytes = std::fs::read(path)?;
                // pdf-extract panics on some malformed fonts and page trees.
                catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(&bytes)))
                    .map_err(|panic| ExtractError::Pdf(panic_message(panic.as_ref())))?
                    .map_err(|e| ExtractError::Pdf(e.to_string()))
            }
            "docx" => docx_text(&std::fs::read(path)?),
            "pptx" => pptx_text(&std::fs::read(path)?),
            "xlsx" => xlsx_text(&std::fs::read(path)?),
            other => Err(ExtractError::Unsupported(if other.is_empty() {
                path.display().to_string()
            } else {
                format!(".{}", other)
            })),
        }
    }
}

/// Best-effort text of a caught panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

type Package<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn open_package(bytes: &[u8]) -> Result<Package<'_>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

fn read_part(package: &mut Package<'_>, name: &str) -> Result<Vec<u8>, ExtractError> {
    let part = package
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    part.take(MAX_PART_BYTES).read_to_end(&mut out)?;
    if out.len() as u64 >= MAX_PART_BYTES {
        return Err(ExtractError::Ooxml(format!(
            "{} exceeds size limit ({} bytes)",
            name, MAX_PART_BYTES
        )));
    }
    Ok(out)
}

/// Part names matching `prefix<N>.xml`, ordered by `N`.
fn numbered_parts(package: &Package<'_>, prefix: &str) -> Vec<String> {
    let mut names: Vec<(u32, String)> = package
        .file_names()
        .filter_map(|n| {
            let number = n.strip_prefix(prefix)?.strip_suffix(".xml")?.parse().ok()?;
            Some((number, n.to_string()))
        })
        .collect();
    names.sort();
    names.into_iter().map(|(_, n)| n).collect()
}

fn xml_err(e: quick_xml::Error) -> ExtractError {
    ExtractError::Ooxml(e.to_string())
}

/// Concatenate the text of every `text_tag` element, ending a line whenever
/// a `line_tag` element closes.
fn runs_text(xml: &[u8], text_tag: &[u8], line_tag: &[u8]) -> Result<String, ExtractError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut in_run = false;
    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Start(e) if e.local_name().as_ref() == text_tag => in_run = true,
            Event::Text(t) if in_run => out.push_str(&t.unescape().map_err(xml_err)?),
            Event::End(e) => {
                let name = e.local_name();
                if name.as_ref() == text_tag {
                    in_run = false;
                } else if name.as_ref() == line_tag && !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

fn docx_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut package = open_package(bytes)?;
    let xml = read_part(&mut package, "word/document.xml")?;
    runs_text(&xml, b"t", b"p")
}

fn pptx_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut package = open_package(bytes)?;
    let mut slides = Vec::new();
    for name in numbered_parts(&package, "ppt/slides/slide") {
        let xml = read_part(&mut package, &name)?;
        let text = runs_text(&xml, b"t", b"p")?;
        if !text.is_empty() {
            slides.push(text);
        }
    }
    Ok(slides.join("\n"))
}

fn xlsx_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut package = open_package(bytes)?;
    let shared = if package.file_names().any(|n| n == "xl/sharedStrings.xml") {
        shared_strings(&read_part(&mut package, "xl/sharedStrings.xml")?)?
    } else {
        Vec::new()
    };
    let mut sheets = Vec::new();
    for name in numbered_parts(&package, "xl/worksheets/sheet")
        .into_iter()
        .take(MAX_SHEETS)
    {
        let xml = read_part(&mut package, &name)?;
        let text = sheet_rows(&xml, &shared)?;
        if !text.is_empty() {
            sheets.push(text);
        }
    }
    Ok(sheets.join("\n"))
}

/// One entry per `<si>`, joining rich-text runs.
fn shared_strings(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_t = true,
                _ => {}
            },
            Event::Text(t) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&t.unescape().map_err(xml_err)?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => strings.extend(current.take()),
                b"t" => in_t = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

#[derive(PartialEq)]
enum CellKind {
    Shared,
    Inline,
    Value,
}

/// Cells space-separated, rows newline-separated.
fn sheet_rows(xml: &[u8], shared: &[String]) -> Result<String, ExtractError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut rows: Vec<String> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut kind = CellKind::Value;
    let mut capture = false;
    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"c" => {
                    kind = CellKind::Value;
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"t" {
                            kind = match attr.value.as_ref() {
                                b"s" => CellKind::Shared,
                                b"inlineStr" => CellKind::Inline,
                                _ => CellKind::Value,
                            };
                        }
                    }
                }
                b"v" => capture = kind != CellKind::Inline,
                b"t" => capture = kind == CellKind::Inline,
                _ => {}
            },
            Event::Text(t) if capture => {
                let raw = t.unescape().map_err(xml_err)?;
                let value = raw.trim();
                let cell = match kind {
                    CellKind::Shared => value
                        .parse::<usize>()
                        .ok()
                        .and_then(|i| shared.get(i).cloned()),
                    _ => Some(value.to_string()),
                };
                if let Some(cell) = cell.filter(|c| !c.is_empty()) {
                    row.push(cell);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" => capture = false,
                b"row" => {
                    if !row.is_empty() {
                        rows.push(row.join(" "));
                        row.clear();
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    if !row.is_empty() {
        rows.push(row.join(" "));
    }
    Ok(rows.join("\n"))
}
