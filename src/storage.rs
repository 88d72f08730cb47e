//! Local blob storage with a two-phase upload protocol.
//!
//! Uploads follow a reserve-then-register flow so large files can be PUT
//! directly: [`BlobStore::reserve`] hands out a storage id, the client sends
//! bytes to the blob endpoint for that id, and the metadata registration
//! step (see [`crate::ingest`]) consumes the id. Registration is idempotent
//! for a given storage id — if the metadata write fails after the bytes are
//! stored, the caller retries registration with the same id and no orphaned
//! blob reference ever enters the documents table.

use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|e| Error::Storage(format!("create blob root {}: {}", root.display(), e)))?;
        Ok(Self { root })
    }

    /// First phase of an upload: allocate a storage id for the caller to
    /// PUT bytes against.
    pub fn reserve(&self) -> String {
        Uuid::new_v4().to_string()
    }

    fn blob_path(&self, storage_id: &str) -> Result<PathBuf> {
        // Storage ids are UUIDs we handed out; reject anything path-like.
        if storage_id.is_empty()
            || storage_id
                .chars()
                .any(|c| !c.is_ascii_alphanumeric() && c != '-')
        {
            return Err(Error::Validation(format!(
                "invalid storage id: {}",
                storage_id
            )));
        }
        Ok(self.root.join(storage_id))
    }

    pub fn put(&self, storage_id: &str, bytes: &[u8]) -> Result<()> {
        let path = self.blob_path(storage_id)?;
        std::fs::write(&path, bytes)
            .map_err(|e| Error::Storage(format!("write blob {}: {}", path.display(), e)))
    }

    pub fn get(&self, storage_id: &str) -> Result<Vec<u8>> {
        let path = self.blob_path(storage_id)?;
        if !path.exists() {
            return Err(Error::not_found("blob", storage_id));
        }
        std::fs::read(&path)
            .map_err(|e| Error::Storage(format!("read blob {}: {}", path.display(), e)))
    }

    pub fn exists(&self, storage_id: &str) -> bool {
        self.blob_path(storage_id)
            .map(|p| p.exists())
            .unwrap_or(false)
    }

    pub fn delete(&self, storage_id: &str) -> Result<()> {
        let path = self.blob_path(storage_id)?;
        if path.exists() {
            std::fs::remove_file(&path)
                .map_err(|e| Error::Storage(format!("delete blob {}: {}", path.display(), e)))?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
