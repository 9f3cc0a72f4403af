//! Data models for the upload service

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::path::to_slash_path;

/// Fixed destination for every accepted upload.
///
/// `root` is the directory returned paths are reported relative to; `dir` is
/// the upload directory itself, either relative to `root` or absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadDirectory {
    root: PathBuf,
    dir: PathBuf,
}

impl UploadDirectory {
    pub fn new(root: impl Into<PathBuf>, dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            dir: dir.into(),
        }
    }

    /// Filesystem location of the upload directory
    pub fn path(&self) -> PathBuf {
        if self.dir.is_absolute() {
            self.dir.clone()
        } else {
            self.root.join(&self.dir)
        }
    }

    /// Filesystem location of a stored file
    pub fn file_path(&self, storage_name: &str) -> PathBuf {
        self.path().join(storage_name)
    }

    /// Path of a stored file as reported to clients, e.g. `uploads/1700000000000-part.stl`
    pub fn relative_path(&self, storage_name: &str) -> String {
        let stored = self.file_path(storage_name);
        match relative_to(&stored, &self.root) {
            Some(relative) => to_slash_path(&relative),
            None => stored.to_string_lossy().replace('\\', "/"),
        }
    }
}

fn relative_to(path: &Path, base: &Path) -> Option<PathBuf> {
    if path.is_absolute() {
        path.strip_prefix(base).ok().map(Path::to_path_buf)
    } else {
        Some(path.strip_prefix(base).unwrap_or(path).to_path_buf())
    }
}

/// A file accepted and written to the upload directory
#[derive(Debug, Clone, Serialize)]
pub struct StoredFile {
    /// Generated `<epoch-millis>-<sanitized-name>`
    pub storage_name: String,
    /// Location on disk
    pub path: PathBuf,
    /// Location relative to the service root, `/`-separated
    pub relative_path: String,
    /// Name claimed by the client, kept only as metadata
    pub original_name: String,
    /// Bytes written
    pub size: u64,
    pub stored_at: DateTime<Utc>,
}

/// Body of a successful `POST /upload`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadResponse {
    pub filename: String,
    pub originalname: String,
}

impl From<&StoredFile> for UploadResponse {
    fn from(file: &StoredFile) -> Self {
        Self {
            filename: file.relative_path.clone(),
            originalname: file.original_name.clone(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub upload_dir: String,
}
