//! Local filesystem persistence for [`MemoryStorage`].
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── config.toml           # Sites and crawler configuration
//! └── index.json            # Snapshot of all tables
//! ```

use std::path::{Path, PathBuf};

use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::storage::MemoryStorage;
use crate::storage::memory::Snapshot;

const SNAPSHOT_KEY: &str = "index.json";

/// Reads and writes table snapshots under a root directory.
#[derive(Debug, Clone)]
pub struct LocalSnapshot {
    root_dir: PathBuf,
}

impl LocalSnapshot {
    /// Create a new LocalSnapshot rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Persist every table of `storage`.
    pub async fn save(&self, storage: &MemoryStorage) -> Result<()> {
        let snapshot = storage.snapshot().await;
        self.write_json(SNAPSHOT_KEY, &snapshot).await?;
        log::info!(
            "Snapshot written to {} ({} sites, {} pages, {} lemmas)",
            self.path(SNAPSHOT_KEY).display(),
            snapshot.sites.len(),
            snapshot.pages.len(),
            snapshot.lemmas.len()
        );
        Ok(())
    }

    /// Load the stored snapshot, or an empty store when none exists.
    pub async fn load(&self) -> Result<MemoryStorage> {
        match self.read_json::<Snapshot>(SNAPSHOT_KEY).await? {
            Some(snapshot) => Ok(MemoryStorage::from_snapshot(snapshot)),
            None => {
                log::warn!("No snapshot found in {}", self.root_dir.display());
                Ok(MemoryStorage::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewPage, SiteStatus};
    use crate::storage::SearchStorage;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_and_read() {
        let tmp = TempDir::new().unwrap();
        let local = LocalSnapshot::new(tmp.path());

        local.write_bytes("test.txt", b"hello").await.unwrap();
        let data = local.read_bytes("test.txt").await.unwrap();
        assert_eq!(data, Some(b"hello".to_vec()));
        assert!(!tmp.path().join("test.tmp").exists());
    }

    #[tokio::test]
    async fn test_load_without_snapshot_is_empty() {
        let tmp = TempDir::new().unwrap();
        let local = LocalSnapshot::new(tmp.path());

        let storage = local.load().await.unwrap();
        assert_eq!(storage.counts().await.unwrap().sites, 0);
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let tmp = TempDir::new().unwrap();
        let local = LocalSnapshot::new(tmp.path().join("nested"));

        let storage = MemoryStorage::new();
        let site = storage
            .create_site("https://a.ru", "A", SiteStatus::Indexed)
            .await
            .unwrap();
        storage
            .insert_page(NewPage {
                site_id: site.id,
                path: "/".into(),
                code: 200,
                content: "<html><body>текст</body></html>".into(),
            })
            .await
            .unwrap();

        local.save(&storage).await.unwrap();
        let loaded = local.load().await.unwrap();

        let stored = loaded.find_site("https://a.ru").await.unwrap().unwrap();
        assert_eq!(stored.status, SiteStatus::Indexed);
        assert_eq!(loaded.count_pages(stored.id).await.unwrap(), 1);
    }
}
