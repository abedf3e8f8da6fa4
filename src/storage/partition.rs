//! A single keyed partition: one file per note id under a root directory.
//!
//! Writes go to a temp file first and are renamed into place, so a
//! partially written entry is never observable under its final name.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::StoreError;

/// One keyed blob partition (metadata, audio, or photo)
#[derive(Debug, Clone)]
pub struct Partition {
    root: PathBuf,
    extension: &'static str,
}

impl Partition {
    pub fn new(root: PathBuf, extension: &'static str) -> Self {
        Self { root, extension }
    }

    /// Create the partition directory (safe to call repeatedly)
    pub async fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Write an entry atomically (temp file, fsync, rename)
    pub async fn write(&self, id: Uuid, data: &[u8]) -> Result<(), StoreError> {
        let path = self.entry_path(id);
        let temp_path = path.with_extension("tmp");

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        fs::rename(&temp_path, &path).await?;

        tracing::debug!("wrote {} ({} bytes)", path.display(), data.len());
        Ok(())
    }

    /// Read an entry; `None` if the id has no entry in this partition
    pub async fn read(&self, id: Uuid) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.entry_path(id);
        match fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, id: Uuid) -> bool {
        fs::try_exists(self.entry_path(id)).await.unwrap_or(false)
    }

    /// Entry size in bytes, if present
    pub async fn size(&self, id: Uuid) -> Option<u64> {
        fs::metadata(self.entry_path(id)).await.ok().map(|m| m.len())
    }

    /// Remove an entry. Idempotent: removing a missing id is not an
    /// error. Returns the bytes freed, `None` if nothing was there.
    pub async fn remove(&self, id: Uuid) -> Result<Option<u64>, StoreError> {
        let path = self.entry_path(id);
        let size = match fs::metadata(&path).await {
            Ok(m) => m.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        fs::remove_file(&path).await?;
        tracing::debug!("removed {} ({} bytes)", path.display(), size);
        Ok(Some(size))
    }

    /// Enumerate all entry ids in this partition
    pub async fn keys(&self) -> Result<Vec<Uuid>, StoreError> {
        let mut keys = Vec::new();

        if !fs::try_exists(&self.root).await.unwrap_or(false) {
            return Ok(keys);
        }

        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(self.extension) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if let Ok(id) = Uuid::parse_str(stem) {
                    keys.push(id);
                }
            }
        }

        Ok(keys)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, id: Uuid) -> PathBuf {
        self.root.join(format!("{}.{}", id, self.extension))
    }
}
