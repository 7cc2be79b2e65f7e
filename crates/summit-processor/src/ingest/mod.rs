//! Raw instrument file ingestion
//!
//! Each instrument has a `parser` (pure text to model), a `storage` module
//! (idempotent inserts and the queries later stages need) and a `pipeline`
//! module implementing [`crate::pipeline::InstrumentProcessor`].
//!
//! - [`voc`]: LabView logs, VOC.LOG peak batches, response factors, windows
//! - [`methane`]: per-run sample logs and CH4.LOG peak batches
//! - [`picarro`]: continuous analyzer data files
//! - [`daily`]: VOC housekeeping logs

pub mod daily;
pub mod gc_storage;
pub mod methane;
pub mod peak_log;
pub mod picarro;
pub mod voc;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A file found under an instrument's data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
}

fn walk(dir: &Path, extension: &str) -> Result<Vec<FileEntry>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir) {
        let entry = entry.with_context(|| format!("Failed to read directory {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let matches = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if !matches {
            continue;
        }

        let size = entry
            .metadata()
            .with_context(|| format!("Failed to stat {}", entry.path().display()))?
            .len();
        files.push(FileEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: entry.into_path(),
            size,
        });
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

/// Recursively list files under `dir` whose extension matches
/// (case-insensitive), sorted by file name.
pub async fn list_files(dir: &Path, extension: &str) -> Result<Vec<FileEntry>> {
    let dir = dir.to_path_buf();
    let extension = extension.to_string();

    tokio::task::spawn_blocking(move || walk(&dir, &extension))
        .await
        .context("Directory walk task panicked")?
}

/// Current size of a file in bytes.
pub async fn file_size(path: &Path) -> Result<u64> {
    let metadata = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("Failed to stat {}", path.display()))?;
    Ok(metadata.len())
}
