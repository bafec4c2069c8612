//! File-backed store for raw uploads.
//!
//! Every upload is written once into the store directory under a unique
//! name and never modified afterwards. Datasets keep a path into this
//! directory and re-read the bytes when a question is asked.
//!
//! The directory is either supplied by the caller or a temporary directory
//! that is removed when the store is dropped.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;

/// Location and fingerprint of a persisted upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    pub path: PathBuf,
    /// Hex SHA-256 of the bytes
    pub digest: String,
    pub byte_len: u64,
}

pub struct UploadStore {
    dir: PathBuf,
    _temp: Option<TempDir>,
}

impl UploadStore {
    /// Create a store in the given directory, creating it if needed
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();

        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }

        Ok(Self { dir, _temp: None })
    }

    /// Create a store in a fresh temporary directory
    pub fn temporary() -> Result<Self> {
        let temp = tempfile::Builder::new()
            .prefix("tablesage-uploads-")
            .tempdir()?;
        Ok(Self {
            dir: temp.path().to_path_buf(),
            _temp: Some(temp),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the bytes under a unique file name derived from `display_name`
    pub fn put(&self, display_name: &str, bytes: &[u8]) -> Result<StoredUpload> {
        let file_name = format!("{}_{}", Uuid::new_v4().simple(), display_name);
        let path = self.dir.join(file_name);
        fs::write(&path, bytes)?;

        let stored = StoredUpload {
            path,
            digest: content_digest(bytes),
            byte_len: bytes.len() as u64,
        };
        debug!(path = %stored.path.display(), bytes = stored.byte_len, "stored upload");
        Ok(stored)
    }

    /// Read back a stored upload
    pub fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    /// Delete a stored upload that no dataset refers to
    pub fn remove(&self, stored: &StoredUpload) -> io::Result<()> {
        fs::remove_file(&stored.path)?;
        debug!(path = %stored.path.display(), "removed stored upload");
        Ok(())
    }
}

/// Stable SHA-256 hex digest of the content
pub fn content_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Reduce a client-supplied filename to a safe display name.
///
/// Path components are dropped, spaces become underscores and anything
/// other than ASCII alphanumerics, `.`, `-` and `_` is removed. Returns
/// `None` when nothing usable is left.
pub fn sanitize_filename(filename: &str) -> Option<String> {
    let base = filename
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(filename);

    let cleaned: String = base
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    let cleaned = cleaned.trim_matches(|c| c == '.' || c == '_').to_string();

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}
