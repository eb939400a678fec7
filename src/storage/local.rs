//! Local filesystem backend
//!
//! Serves a directory tree rooted at a fixed path. Remote stores mounted into
//! the local namespace (sshfs, davfs2, NFS) are reached through this backend.

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::debug;

use crate::error::{ConnectionError, Result, StorageError};

use super::{FileInfo, StorageReader, StorageResult, StorageWriter, path as spath};

/// Directory-tree storage rooted at `root`
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Connect to a local storage rooted at an existing directory
    ///
    /// # Arguments
    /// * `root` - Root directory; must exist
    ///
    /// # Returns
    /// * `Result<Self>` - Storage session or connection error
    pub async fn connect(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let metadata = fs::metadata(&root).await.map_err(|e| {
            ConnectionError::Storage(format!("{}: {}", root.display(), e))
        })?;
        if !metadata.is_dir() {
            return Err(ConnectionError::Storage(format!(
                "{}: not a directory",
                root.display()
            ))
            .into());
        }

        debug!("Opened local storage at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a storage path onto the local filesystem
    fn resolve(&self, path: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(spath::normalize(path));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::PermissionDenied(path.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn info(name: String, metadata: &std::fs::Metadata) -> FileInfo {
        FileInfo {
            name,
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            is_dir: metadata.is_dir(),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        }
    }

    pub async fn stat(&self, path: &str) -> StorageResult<FileInfo> {
        let local = self.resolve(path)?;
        let metadata = fs::metadata(&local)
            .await
            .map_err(|e| StorageError::from_io(path, e))?;
        let (_, name) = spath::split(path);
        Ok(Self::info(name.to_string(), &metadata))
    }

    pub async fn list(&self, dir: &str) -> StorageResult<Vec<FileInfo>> {
        let local = self.resolve(dir)?;
        let mut entries = fs::read_dir(&local)
            .await
            .map_err(|e| StorageError::from_io(dir, e))?;

        let mut infos = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::from_io(dir, e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            match entry.metadata().await {
                Ok(metadata) => infos.push(Self::info(name, &metadata)),
                // Entry vanished between readdir and stat
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::from_io(spath::join(&[dir, name.as_str()]), e)),
            }
        }
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }

    pub async fn create(&self, path: &str) -> StorageResult<StorageWriter> {
        let local = self.resolve(path)?;
        let file = fs::File::create(&local)
            .await
            .map_err(|e| StorageError::from_io(path, e))?;
        Ok(Box::new(file))
    }

    pub async fn open(&self, path: &str) -> StorageResult<StorageReader> {
        let local = self.resolve(path)?;
        let file = fs::File::open(&local)
            .await
            .map_err(|e| StorageError::from_io(path, e))?;
        Ok(Box::new(file))
    }

    pub async fn mkdir_all(&self, path: &str) -> StorageResult<()> {
        let local = self.resolve(path)?;
        fs::create_dir_all(&local)
            .await
            .map_err(|e| StorageError::from_io(path, e))
    }

    pub async fn rename(&self, old: &str, new: &str) -> StorageResult<()> {
        let from = self.resolve(old)?;
        let to = self.resolve(new)?;
        fs::rename(&from, &to)
            .await
            .map_err(|e| StorageError::from_io(old, e))
    }

    pub async fn remove(&self, path: &str) -> StorageResult<()> {
        let local = self.resolve(path)?;
        let metadata = fs::symlink_metadata(&local)
            .await
            .map_err(|e| StorageError::from_io(path, e))?;
        let result = if metadata.is_dir() {
            fs::remove_dir(&local).await
        } else {
            fs::remove_file(&local).await
        };
        result.map_err(|e| StorageError::from_io(path, e))
    }
}
