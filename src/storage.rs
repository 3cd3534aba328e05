use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;
use tracing::warn;

#[derive(Debug, Error)]
pub enum FileStoreError {
    #[error("file was not found: {}", .0.display())]
    Missing(PathBuf),
    #[error("destination already exists: {}", .0.display())]
    Occupied(PathBuf),
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to move {} to {}: {source}", from.display(), to.display())]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("file I/O failed at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Physical storage for document bytes, addressed by filesystem path.
#[async_trait]
pub trait FileStore: Send + Sync + 'static {
    /// Writes `bytes` at `path`, creating parent directories and replacing
    /// any existing file.
    async fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), FileStoreError>;

    async fn exists(&self, path: &Path) -> Result<bool, FileStoreError>;

    /// Moves `from` to `to`. Fails with `Missing` when the source is absent and
    /// `Occupied` when the destination already holds a file.
    async fn rename(&self, from: &Path, to: &Path) -> Result<(), FileStoreError>;

    async fn remove(&self, path: &Path) -> Result<(), FileStoreError>;

    /// Removes `dir` when it exists and holds no entries. Returns whether the
    /// directory was removed.
    async fn remove_dir_if_empty(&self, dir: &Path) -> Result<bool, FileStoreError>;
}

#[derive(Debug, Clone, Default)]
pub struct LocalFileStore;

impl LocalFileStore {
    pub fn new() -> Self {
        Self
    }
}

async fn ensure_parent(path: &Path) -> Result<(), FileStoreError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    fs::create_dir_all(parent)
        .await
        .map_err(|source| FileStoreError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), FileStoreError> {
        ensure_parent(path).await?;
        fs::write(path, bytes)
            .await
            .map_err(|source| FileStoreError::Io {
                path: path.to_path_buf(),
                source,
            })
    }

    async fn exists(&self, path: &Path) -> Result<bool, FileStoreError> {
        fs::try_exists(path)
            .await
            .map_err(|source| FileStoreError::Io {
                path: path.to_path_buf(),
                source,
            })
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<(), FileStoreError> {
        if !self.exists(from).await? {
            return Err(FileStoreError::Missing(from.to_path_buf()));
        }
        if self.exists(to).await? {
            return Err(FileStoreError::Occupied(to.to_path_buf()));
        }
        ensure_parent(to).await?;

        let rename_err = match fs::rename(from, to).await {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };

        // Cross-device moves cannot be renamed; fall back to copy then remove.
        warn!(
            from = %from.display(),
            to = %to.display(),
            error = %rename_err,
            "rename failed, falling back to copy"
        );
        if let Err(source) = fs::copy(from, to).await {
            let _ = fs::remove_file(to).await;
            return Err(FileStoreError::Move {
                from: from.to_path_buf(),
                to: to.to_path_buf(),
                source,
            });
        }
        if let Err(source) = fs::remove_file(from).await {
            let _ = fs::remove_file(to).await;
            return Err(FileStoreError::Move {
                from: from.to_path_buf(),
                to: to.to_path_buf(),
                source,
            });
        }
        Ok(())
    }

    async fn remove(&self, path: &Path) -> Result<(), FileStoreError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(FileStoreError::Missing(path.to_path_buf()))
            }
            Err(source) => Err(FileStoreError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    async fn remove_dir_if_empty(&self, dir: &Path) -> Result<bool, FileStoreError> {
        let io_err = |source: io::Error| FileStoreError::Io {
            path: dir.to_path_buf(),
            source,
        };
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(source) => return Err(io_err(source)),
        };
        if entries.next_entry().await.map_err(io_err)?.is_some() {
            return Ok(false);
        }
        fs::remove_dir(dir).await.map_err(io_err)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a/b/plan.pdf");
        let store = LocalFileStore::new();

        store.write(&target, b"%PDF").await.unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"%PDF");
    }

    #[tokio::test]
    async fn rename_moves_into_new_directory() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("staging/plan.pdf");
        let to = dir.path().join("tower/plan.pdf-ABDs/plan.pdf");
        let store = LocalFileStore::new();
        store.write(&from, b"bytes").await.unwrap();

        store.rename(&from, &to).await.unwrap();

        assert!(!from.exists());
        assert_eq!(std::fs::read(&to).unwrap(), b"bytes");
    }

    #[tokio::test]
    async fn rename_missing_source_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new();
        let err = store
            .rename(&dir.path().join("nope.pdf"), &dir.path().join("x.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, FileStoreError::Missing(_)));
    }

    #[tokio::test]
    async fn rename_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a.pdf");
        let to = dir.path().join("b.pdf");
        let store = LocalFileStore::new();
        store.write(&from, b"new").await.unwrap();
        store.write(&to, b"old").await.unwrap();

        let err = store.rename(&from, &to).await.unwrap_err();

        assert!(matches!(err, FileStoreError::Occupied(_)));
        assert_eq!(std::fs::read(&to).unwrap(), b"old");
        assert!(from.exists());
    }

    #[tokio::test]
    async fn remove_missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = LocalFileStore::new()
            .remove(&dir.path().join("gone.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, FileStoreError::Missing(_)));
    }

    #[tokio::test]
    async fn only_empty_directories_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new();
        let empty = dir.path().join("plan.pdf-ABDs");
        let busy = dir.path().join("roof.pdf-ABDs");
        std::fs::create_dir_all(&empty).unwrap();
        store.write(&busy.join("act.pdf"), b"act").await.unwrap();

        assert!(store.remove_dir_if_empty(&empty).await.unwrap());
        assert!(!empty.exists());
        assert!(!store.remove_dir_if_empty(&busy).await.unwrap());
        assert!(busy.join("act.pdf").exists());
        assert!(!store
            .remove_dir_if_empty(&dir.path().join("gone-ABDs"))
            .await
            .unwrap());
    }
}
