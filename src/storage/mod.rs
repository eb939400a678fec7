//! Storage capability for published partitions
//!
//! This module provides a minimal, backend-agnostic filesystem interface over a
//! hierarchical path namespace:
//! - `stat`, `list`, `create`, `open`
//! - `mkdir_all`, `rename`, `remove`
//! - path joining and splitting (see [`path`])
//!
//! # Backends
//!
//! [`Storage`] is a closed set of variants selected at construction:
//!
//! 1. **Local**: a directory tree on a local or mounted filesystem
//! 2. **Memory**: a shared in-memory tree used as a test double
//!
//! `rename` must be atomic for observers: a reader never sees a partially
//! written file under the destination name. Both backends only ever rename
//! within one directory, which keeps that guarantee on every backend.

pub mod local;
pub mod memory;
pub mod path;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::{StorageBackend, StorageConfig};
use crate::error::{Result, StorageError};

pub use local::LocalStorage;
pub use memory::MemoryStorage;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Writable handle returned by [`Storage::create`]
pub type StorageWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Readable handle returned by [`Storage::open`]
pub type StorageReader = Box<dyn AsyncRead + Send + Unpin>;

/// Metadata for a single directory entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Final path component
    pub name: String,
    /// Size in bytes (0 for directories)
    pub size: u64,
    /// Whether the entry is a directory
    pub is_dir: bool,
    /// Last modification time, when the backend reports one
    pub modified: Option<DateTime<Utc>>,
}

/// Storage backend
#[derive(Debug, Clone)]
pub enum Storage {
    Local(LocalStorage),
    Memory(MemoryStorage),
}

impl Storage {
    /// Open the backend described by the configuration
    ///
    /// # Returns
    /// * `Result<Self>` - Ready storage session, or a connection error
    pub async fn from_config(config: &StorageConfig) -> Result<Self> {
        match config.backend {
            StorageBackend::Local => Ok(Storage::Local(LocalStorage::connect(&config.root).await?)),
            StorageBackend::Memory => Ok(Storage::Memory(MemoryStorage::new())),
        }
    }

    /// Human-readable description for logs
    pub fn describe(&self) -> String {
        match self {
            Storage::Local(s) => format!("local:{}", s.root().display()),
            Storage::Memory(_) => "memory".to_string(),
        }
    }

    pub async fn stat(&self, path: &str) -> StorageResult<FileInfo> {
        match self {
            Storage::Local(s) => s.stat(path).await,
            Storage::Memory(s) => s.stat(path),
        }
    }

    pub async fn list(&self, dir: &str) -> StorageResult<Vec<FileInfo>> {
        match self {
            Storage::Local(s) => s.list(dir).await,
            Storage::Memory(s) => s.list(dir),
        }
    }

    /// Create (or truncate) a file and return a writable handle
    pub async fn create(&self, path: &str) -> StorageResult<StorageWriter> {
        match self {
            Storage::Local(s) => s.create(path).await,
            Storage::Memory(s) => s.create(path),
        }
    }

    pub async fn open(&self, path: &str) -> StorageResult<StorageReader> {
        match self {
            Storage::Local(s) => s.open(path).await,
            Storage::Memory(s) => s.open(path),
        }
    }

    pub async fn mkdir_all(&self, path: &str) -> StorageResult<()> {
        match self {
            Storage::Local(s) => s.mkdir_all(path).await,
            Storage::Memory(s) => s.mkdir_all(path),
        }
    }

    /// Atomically move `old` to `new`, replacing `new` if it exists
    pub async fn rename(&self, old: &str, new: &str) -> StorageResult<()> {
        match self {
            Storage::Local(s) => s.rename(old, new).await,
            Storage::Memory(s) => s.rename(old, new),
        }
    }

    pub async fn remove(&self, path: &str) -> StorageResult<()> {
        match self {
            Storage::Local(s) => s.remove(path).await,
            Storage::Memory(s) => s.remove(path),
        }
    }

    /// Check whether a path exists, treating `NotFound` as `false`
    pub async fn exists(&self, path: &str) -> StorageResult<bool> {
        match self.stat(path).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Make sure `path` is a directory, creating it when missing
    pub async fn ensure_dir(&self, path: &str) -> StorageResult<()> {
        match self.stat(path).await {
            Ok(info) if info.is_dir => Ok(()),
            Ok(_) => Err(StorageError::other(path, "not a directory")),
            Err(StorageError::NotFound(_)) => self.mkdir_all(path).await,
            Err(e) => Err(e),
        }
    }
}

impl From<MemoryStorage> for Storage {
    fn from(storage: MemoryStorage) -> Self {
        Storage::Memory(storage)
    }
}

impl From<LocalStorage> for Storage {
    fn from(storage: LocalStorage) -> Self {
        Storage::Local(storage)
    }
}
