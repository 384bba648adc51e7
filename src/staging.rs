//! Staging area: the per-session directory holding segment files and the concat list.
//!
//! A [`StagingArea`] is acquired at the start of a download session and
//! released with [`StagingArea::cleanup`] on both the success and failure
//! paths. If it is dropped without an explicit cleanup and was not retained,
//! the directory is removed synchronously in `Drop`, blocking whichever thread
//! drops it. Async callers should await [`StagingArea::cleanup`] instead.

use std::path::{Path, PathBuf};

use crate::error::Result;

/// File name of the concatenation list inside the staging directory
pub const CONCAT_LIST_FILE_NAME: &str = "concat.txt";

/// Deterministic, sortable file name for segment `index`
pub fn segment_file_name(index: usize) -> String {
    format!("segment_{index:06}.ts")
}

/// Quote `path` for a concat list line: single quotes, with embedded quotes
/// written as `'\''`.
fn quote_path(path: &Path) -> String {
    let raw = path.to_string_lossy();
    format!("'{}'", raw.replace('\'', r"'\''"))
}

/// Render the concat list for `files`, one `file '<path>'` line each
pub fn render_concat_list(files: &[PathBuf]) -> String {
    let mut out = String::new();
    for file in files {
        out.push_str("file ");
        out.push_str(&quote_path(file));
        out.push('\n');
    }
    out
}

/// Temporary directory owned by one download session
#[derive(Debug)]
pub struct StagingArea {
    dir: PathBuf,
    retained: bool,
    cleaned: bool,
}

impl StagingArea {
    /// Create `dir` (and parents) and take ownership of it.
    ///
    /// The stored path is canonicalized so file paths written to the concat
    /// list are absolute.
    pub async fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        let dir = tokio::fs::canonicalize(&dir).await?;
        tracing::debug!(path = ?dir, "Staging area created");
        Ok(Self {
            dir,
            retained: false,
            cleaned: false,
        })
    }

    /// The staging directory
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Path of segment `index` inside the staging directory
    pub fn segment_path(&self, index: usize) -> PathBuf {
        self.dir.join(segment_file_name(index))
    }

    /// Path of the concat list
    pub fn concat_list_path(&self) -> PathBuf {
        self.dir.join(CONCAT_LIST_FILE_NAME)
    }

    /// Write the concat list for `ordered_files` and return its path
    pub async fn create_concat_list(&self, ordered_files: &[PathBuf]) -> Result<PathBuf> {
        let path = self.concat_list_path();
        tokio::fs::write(&path, render_concat_list(ordered_files)).await?;
        tracing::debug!(path = ?path, entries = ordered_files.len(), "Concat list written");
        Ok(path)
    }

    /// Keep the directory when this value is dropped
    pub fn retain(&mut self) {
        self.retained = true;
    }

    /// Whether [`retain`](Self::retain) was called
    pub fn is_retained(&self) -> bool {
        self.retained
    }

    /// Remove the staging directory tree.
    ///
    /// Succeeds if the directory is already gone.
    pub async fn cleanup(&mut self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {
                tracing::info!(path = ?self.dir, "Staging area removed");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.cleaned = true;
        Ok(())
    }
}

/// Removes the directory with blocking filesystem calls unless it was retained
/// or already cleaned up.
impl Drop for StagingArea {
    fn drop(&mut self) {
        if self.retained || self.cleaned {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.dir)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(
                path = ?self.dir,
                error = %e,
                "Failed to remove staging area on drop"
            );
        }
    }
}
