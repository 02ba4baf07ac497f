//! JSON file store.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::StateStore;
use crate::error::PersistenceError;

/// Stores the blob in a single file.
///
/// Saves go to a sibling temp file that is then renamed over the target, so
/// a reader sees either the old blob or the new one.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// A store backed by `path`. Parent directories are created on save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map_or_else(|| OsString::from("state"), ToOwned::to_owned);
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn unavailable(action: &str, path: &Path, err: &std::io::Error) -> PersistenceError {
    PersistenceError::Unavailable(format!("{action} {}: {err}", path.display()))
}

#[async_trait]
impl StateStore for FileStore {
    async fn load(&self) -> Result<Option<String>, PersistenceError> {
        match fs::read_to_string(&self.path).await {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(unavailable("failed to read", &self.path, &e)),
        }
    }

    async fn save(&self, blob: &str) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| unavailable("failed to create", parent, &e))?;
        }

        let temp = self.temp_path();
        let write = async {
            let mut file = fs::File::create(&temp).await?;
            file.write_all(blob.as_bytes()).await?;
            file.sync_all().await
        };
        if let Err(e) = write.await {
            let _ = fs::remove_file(&temp).await;
            return Err(unavailable("failed to write", &temp, &e));
        }

        if let Err(e) = fs::rename(&temp, &self.path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(unavailable("failed to replace", &self.path, &e));
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), PersistenceError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(unavailable("failed to remove", &self.path, &e)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_loads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("state.json"));
        assert_eq!(store.load().await.unwrap(), None);
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_save_creates_parent_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested/deeper/state.json"));

        store.save("first").await.unwrap();
        store.save("second").await.unwrap();
        assert_eq!(store.load().await.unwrap().as_deref(), Some("second"));
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn test_clear_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("state.json"));
        store.save("blob").await.unwrap();
        store.clear().await.unwrap();
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_failed_save_keeps_previous_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("state.json"));
        store.save("kept").await.unwrap();

        // A directory squatting on the temp path makes the write fail
        std::fs::create_dir(store.temp_path()).unwrap();
        let err = store.save("lost").await.unwrap_err();
        assert!(matches!(err, PersistenceError::Unavailable(_)));
        assert_eq!(store.load().await.unwrap().as_deref(), Some("kept"));
    }
}
