//! File-backed key-value store.
//!
//! One file per key under a base directory. Keys are restricted to a safe
//! character set so they can be used as filenames directly.

use async_trait::async_trait;
use opal_core::error::{OpalError, Result};
use opal_core::kv::KeyValueStore;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Key-value store keeping each value in `<base_dir>/<key>.json`.
pub struct FileKeyValueStore {
    base_dir: PathBuf,
}

impl FileKeyValueStore {
    /// Creates the store, ensuring the base directory exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)
            .await
            .map_err(|e| OpalError::io(format!("create {}: {}", base_dir.display(), e)))?;
        Ok(Self { base_dir })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty()
            || !key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(OpalError::data_access(format!("invalid key '{}'", key)));
        }
        Ok(self.base_dir.join(format!("{}.json", key)))
    }
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(OpalError::io(format!("read {}: {}", path.display(), e))),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        fs::write(&path, value)
            .await
            .map_err(|e| OpalError::io(format!("write {}: {}", path.display(), e)))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(OpalError::io(format!("remove {}: {}", path.display(), e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_set_get_remove_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileKeyValueStore::new(temp_dir.path()).await.unwrap();

        assert_eq!(store.get("snapshot").await.unwrap(), None);

        store.set("snapshot", "{\"a\":1}").await.unwrap();
        assert_eq!(
            store.get("snapshot").await.unwrap(),
            Some("{\"a\":1}".to_string())
        );

        store.remove("snapshot").await.unwrap();
        assert_eq!(store.get("snapshot").await.unwrap(), None);

        // Removing an absent key is not an error.
        store.remove("snapshot").await.unwrap();
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileKeyValueStore::new(temp_dir.path()).await.unwrap();

        store.set("k", "one").await.unwrap();
        store.set("k", "two").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("two".to_string()));
    }

    #[tokio::test]
    async fn test_rejects_path_traversal_keys() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileKeyValueStore::new(temp_dir.path()).await.unwrap();

        assert!(store.get("../escape").await.is_err());
        assert!(store.set("a/b", "v").await.is_err());
    }
}
