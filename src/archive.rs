//! Archive expansion for ingestion.
//!
//! Unpacks `.zip`, `.tar`, and `.tar.gz` / `.tgz` containers into a
//! temporary directory so the ingestion pipeline can extract the files inside
//! like any other document. Failures never propagate: a corrupt or
//! unsupported archive is logged and contributes no files.
//!
//! [`ExpandedArchive`] owns its temporary directory; dropping it removes the
//! directory and everything extracted into it, on success and failure paths
//! alike.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use tempfile::TempDir;
use tracing::{error, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Tar,
    TarGz,
}

impl ArchiveKind {
    /// Detect a supported archive from its file name. Bare `.gz` files are
    /// not tarballs and are not supported.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
        if name.ends_with(".zip") {
            Some(ArchiveKind::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveKind::TarGz)
        } else if name.ends_with(".tar") {
            Some(ArchiveKind::Tar)
        } else {
            None
        }
    }
}

/// An archive unpacked into a private temporary directory.
pub struct ExpandedArchive {
    dir: TempDir,
    files: Vec<PathBuf>,
}

impl ExpandedArchive {
    /// Expand `archive` into a fresh temporary directory.
    ///
    /// Only creating the temporary directory can fail; extraction problems
    /// are logged and leave [`files`](Self::files) empty.
    pub fn expand(archive: &Path) -> std::io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("lrag-archive-").tempdir()?;
        let files = extract_archive(archive, dir.path());
        Ok(Self { dir, files })
    }

    /// Extracted regular files, in sorted walk order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }
}

/// Extract every entry of `archive` into `dest` and return the extracted
/// file paths (directories excluded).
///
/// Unsupported archive types log a warning; extraction errors log an error.
/// Both return an empty list so ingestion of other documents continues.
pub fn extract_archive(archive: &Path, dest: &Path) -> Vec<PathBuf> {
    let Some(kind) = ArchiveKind::from_path(archive) else {
        warn!(path = %archive.display(), "Unsupported archive type");
        return Vec::new();
    };

    let unpacked = match kind {
        ArchiveKind::Zip => unpack_zip(archive, dest),
        ArchiveKind::Tar => unpack_tar(archive, dest, false),
        ArchiveKind::TarGz => unpack_tar(archive, dest, true),
    };

    if let Err(e) = unpacked {
        let message = format!("{:#}", e);
        error!(path = %archive.display(), error = %message, "Error extracting archive");
        return Vec::new();
    }

    WalkDir::new(dest)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect()
}

fn unpack_zip(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = fs::File::open(archive_path)
        .with_context(|| format!("Failed to open {}", archive_path.display()))?;
    let mut zip = zip::ZipArchive::new(file).context("Invalid zip archive")?;
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let Some(relative) = entry.enclosed_name() else {
            bail!("Unsafe archive entry: {}", entry.name());
        };
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = dest.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut outfile = fs::File::create(&target)?;
            std::io::copy(&mut entry, &mut outfile)?;
        }
    }
    Ok(())
}

fn unpack_tar(archive_path: &Path, dest: &Path, gzipped: bool) -> Result<()> {
    let file = fs::File::open(archive_path)
        .with_context(|| format!("Failed to open {}", archive_path.display()))?;
    if gzipped {
        unpack_tar_entries(tar::Archive::new(GzDecoder::new(file)), dest)
    } else {
        unpack_tar_entries(tar::Archive::new(file), dest)
    }
}

fn unpack_tar_entries<R: std::io::Read>(mut archive: tar::Archive<R>, dest: &Path) -> Result<()> {
    for item in archive.entries().context("Invalid tar archive")? {
        let mut entry = item?;
        let entry_type = entry.header().entry_type();
        if entry_type.is_symlink() || entry_type.is_hard_link() {
            let raw = entry.path()?.into_owned();
            warn!(entry = %raw.display(), "Skipping link entry in archive");
            continue;
        }
        // unpack_in refuses paths that would escape `dest`.
        if !entry.unpack_in(dest)? {
            let raw = entry.path()?.into_owned();
            bail!("Unsafe archive entry: {}", raw.display());
        }
    }
    Ok(())
}
