//! Access to the flat store directory.
//!
//! Metadata is always re-read from the filesystem; nothing is cached.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{error, info};
use thiserror::Error;

use crate::StoredFile;

/// Keeps an otherwise empty store directory under version control.
pub const PLACEHOLDER_ENTRY: &str = ".gitkeep";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to read directory {path}: {source}")]
    DirectoryRead { path: PathBuf, source: io::Error },
    #[error("File not found")]
    FileNotFound,
    #[error("failed to delete {path}: {source}")]
    Delete { path: PathBuf, source: io::Error },
    #[error("failed to store {name}: {source}")]
    Persist { name: String, source: io::Error },
    #[error("invalid filename: {0:?}")]
    InvalidFilename(String),
}

/// True when `name` is a bare filename that cannot leave the directory it is
/// joined onto.
pub fn is_flat_filename(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && !name.contains("..")
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}

/// Create `path` and any missing parents. No-op when it already exists.
pub fn ensure_directory(path: &Path) -> io::Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
        info!("Directory created: {}", path.display());
    }
    Ok(())
}

/// An upload spooled to the staging directory, waiting to be moved into the
/// store. The staged file is removed on drop if it was never persisted.
#[derive(Debug)]
pub struct StagedUpload {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
}

impl StagedUpload {
    /// Lower-cased text after the last `.`, or the whole name when it has none.
    pub fn extension(&self) -> String {
        self.name
            .rsplit('.')
            .next()
            .unwrap_or_default()
            .to_lowercase()
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Join a client-supplied name onto the store root, refusing anything
    /// that would resolve outside of it.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, StoreError> {
        if !is_flat_filename(name) {
            return Err(StoreError::InvalidFilename(name.to_string()));
        }
        let path = self.root.join(name);
        if path.parent() != Some(self.root.as_path()) {
            return Err(StoreError::InvalidFilename(name.to_string()));
        }
        Ok(path)
    }

    /// All regular files in the store, newest modification first.
    pub fn list_with_metadata(&self) -> Result<Vec<StoredFile>, StoreError> {
        let read_err = |source| StoreError::DirectoryRead {
            path: self.root.clone(),
            source,
        };

        let mut files = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(read_err)? {
            let entry = entry.map_err(read_err)?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name == PLACEHOLDER_ENTRY {
                continue;
            }

            let metadata = entry.metadata().map_err(read_err)?;
            if !metadata.is_file() {
                continue;
            }
            let modified_at: DateTime<Utc> = metadata.modified().map_err(read_err)?.into();

            files.push(StoredFile {
                name,
                size: metadata.len(),
                modified_at,
            });
        }

        files.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
        Ok(files)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.resolve(name).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Remove a stored file. The existence check and the unlink are not atomic.
    pub fn delete(&self, name: &str) -> Result<(), StoreError> {
        let path = self.resolve(name)?;
        if !path.exists() {
            return Err(StoreError::FileNotFound);
        }

        fs::remove_file(&path).map_err(|source| {
            error!("Error deleting file {}: {}", path.display(), source);
            StoreError::Delete { path: path.clone(), source }
        })?;
        info!("File deleted: {}", path.display());
        Ok(())
    }

    /// Move a staged upload into the store under `name`, replacing any file
    /// already stored under that name.
    pub fn persist(&self, upload: &StagedUpload) -> Result<PathBuf, StoreError> {
        let target = self.resolve(&upload.name)?;
        let persist_err = |source| StoreError::Persist {
            name: upload.name.clone(),
            source,
        };

        if fs::rename(&upload.path, &target).is_err() {
            // rename cannot cross filesystems; fall back to copying
            fs::copy(&upload.path, &target).map_err(persist_err)?;
            fs::remove_file(&upload.path).map_err(persist_err)?;
        }
        Ok(target)
    }
}
