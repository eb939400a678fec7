//! In-memory storage backend
//!
//! A shared tree of directories and byte buffers. Bytes written through a
//! handle are visible immediately, so a reader can observe partially written
//! temp files exactly as on a real filesystem. Failures can be injected to
//! exercise crash and upload-failure paths.

use std::collections::BTreeMap;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use chrono::Utc;
use tokio::io::AsyncWrite;

use super::{FileInfo, StorageReader, StorageResult, StorageWriter, path};
use crate::error::StorageError;

type Buffer = Arc<Mutex<Vec<u8>>>;

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File(Buffer),
}

#[derive(Debug, Default)]
struct Faults {
    /// Writes fail once a file holds this many bytes
    fail_writes_after: Option<usize>,
    /// Every rename fails
    fail_renames: bool,
}

#[derive(Debug, Default)]
struct State {
    entries: BTreeMap<String, Node>,
    faults: Faults,
}

/// Shared in-memory storage; clones refer to the same tree
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    state: Arc<Mutex<State>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl State {
    fn is_dir(&self, path: &str) -> bool {
        path.is_empty() || matches!(self.entries.get(path), Some(Node::Dir))
    }

    fn require_parent(&self, path: &str) -> StorageResult<()> {
        let (parent, _) = path::split(path);
        if self.is_dir(parent) {
            Ok(())
        } else {
            Err(StorageError::NotFound(parent.to_string()))
        }
    }

    fn has_children(&self, dir: &str) -> bool {
        let prefix = format!("{dir}/");
        self.entries
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(key, _)| key.starts_with(&prefix))
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    /// Make every write fail once a file reaches `limit` bytes
    pub fn fail_writes_after(&self, limit: usize) {
        self.state().faults.fail_writes_after = Some(limit);
    }

    /// Make every rename fail
    pub fn fail_renames(&self) {
        self.state().faults.fail_renames = true;
    }

    /// Remove all injected faults
    pub fn clear_faults(&self) {
        self.state().faults = Faults::default();
    }

    /// Store a complete file, creating parent directories
    pub fn put(&self, file_path: &str, content: &[u8]) {
        let file_path = path::normalize(file_path).to_string();
        let mut state = self.state();
        let mut dir = String::new();
        let (parent, _) = path::split(&file_path);
        for part in parent.split('/').filter(|p| !p.is_empty()) {
            dir = path::join(&[dir.as_str(), part]);
            state.entries.entry(dir.clone()).or_insert(Node::Dir);
        }
        state.entries.insert(
            file_path,
            Node::File(Arc::new(Mutex::new(content.to_vec()))),
        );
    }

    /// Snapshot a file's current content
    pub fn read(&self, file_path: &str) -> Option<Vec<u8>> {
        match self.state().entries.get(path::normalize(file_path)) {
            Some(Node::File(buf)) => Some(lock(buf).clone()),
            _ => None,
        }
    }

    /// All file paths currently stored, in sorted order
    pub fn files(&self) -> Vec<String> {
        self.state()
            .entries
            .iter()
            .filter(|(_, node)| matches!(node, Node::File(_)))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn stat(&self, file_path: &str) -> StorageResult<FileInfo> {
        let file_path = path::normalize(file_path);
        let (_, name) = path::split(file_path);
        let state = self.state();
        if file_path.is_empty() {
            return Ok(dir_info(name));
        }
        match state.entries.get(file_path) {
            Some(node) => Ok(node_info(name, node)),
            None => Err(StorageError::NotFound(file_path.to_string())),
        }
    }

    pub fn list(&self, dir: &str) -> StorageResult<Vec<FileInfo>> {
        let dir = path::normalize(dir);
        let state = self.state();
        if !state.is_dir(dir) {
            return Err(StorageError::NotFound(dir.to_string()));
        }
        Ok(state
            .entries
            .iter()
            .filter(|(key, _)| path::split(key).0 == dir)
            .map(|(key, node)| node_info(path::split(key).1, node))
            .collect())
    }

    pub fn create(&self, file_path: &str) -> StorageResult<StorageWriter> {
        let file_path = path::normalize(file_path);
        let mut state = self.state();
        state.require_parent(file_path)?;
        if state.is_dir(file_path) {
            return Err(StorageError::other(file_path, "is a directory"));
        }

        let buffer: Buffer = Arc::new(Mutex::new(Vec::new()));
        state
            .entries
            .insert(file_path.to_string(), Node::File(buffer.clone()));
        Ok(Box::new(MemoryWriter {
            buffer,
            limit: state.faults.fail_writes_after,
        }))
    }

    pub fn open(&self, file_path: &str) -> StorageResult<StorageReader> {
        let file_path = path::normalize(file_path);
        match self.state().entries.get(file_path) {
            Some(Node::File(buf)) => Ok(Box::new(io::Cursor::new(lock(buf).clone()))),
            Some(Node::Dir) => Err(StorageError::other(file_path, "is a directory")),
            None => Err(StorageError::NotFound(file_path.to_string())),
        }
    }

    pub fn mkdir_all(&self, dir: &str) -> StorageResult<()> {
        let dir = path::normalize(dir);
        let mut state = self.state();
        let mut current = String::new();
        for part in dir.split('/').filter(|p| !p.is_empty()) {
            current = path::join(&[current.as_str(), part]);
            match state.entries.get(&current) {
                Some(Node::Dir) => {}
                Some(Node::File(_)) => {
                    return Err(StorageError::other(current, "not a directory"));
                }
                None => {
                    state.entries.insert(current.clone(), Node::Dir);
                }
            }
        }
        Ok(())
    }

    pub fn rename(&self, old: &str, new: &str) -> StorageResult<()> {
        let old = path::normalize(old);
        let new = path::normalize(new);
        let mut state = self.state();
        if state.faults.fail_renames {
            return Err(StorageError::other(old, "injected rename failure"));
        }
        state.require_parent(new)?;

        let node = state
            .entries
            .remove(old)
            .ok_or_else(|| StorageError::NotFound(old.to_string()))?;
        if matches!(node, Node::Dir) {
            let prefix = format!("{old}/");
            let children: Vec<String> = state
                .entries
                .keys()
                .filter(|k| k.starts_with(&prefix))
                .cloned()
                .collect();
            for key in children {
                if let Some(child) = state.entries.remove(&key) {
                    state
                        .entries
                        .insert(format!("{new}/{}", &key[prefix.len()..]), child);
                }
            }
        }
        state.entries.insert(new.to_string(), node);
        Ok(())
    }

    pub fn remove(&self, file_path: &str) -> StorageResult<()> {
        let file_path = path::normalize(file_path);
        let mut state = self.state();
        let node = state.entries.get(file_path).cloned();
        match node {
            None => Err(StorageError::NotFound(file_path.to_string())),
            Some(Node::Dir) if state.has_children(file_path) => {
                Err(StorageError::other(file_path, "directory not empty"))
            }
            Some(_) => {
                state.entries.remove(file_path);
                Ok(())
            }
        }
    }
}

fn dir_info(name: &str) -> FileInfo {
    FileInfo {
        name: name.to_string(),
        size: 0,
        is_dir: true,
        modified: None,
    }
}

fn node_info(name: &str, node: &Node) -> FileInfo {
    match node {
        Node::Dir => dir_info(name),
        Node::File(buf) => FileInfo {
            name: name.to_string(),
            size: lock(buf).len() as u64,
            is_dir: false,
            modified: Some(Utc::now()),
        },
    }
}

/// Write handle appending straight into a stored buffer
struct MemoryWriter {
    buffer: Buffer,
    limit: Option<usize>,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut buffer = lock(&self.buffer);
        let accepted = match self.limit {
            Some(limit) => data.len().min(limit.saturating_sub(buffer.len())),
            None => data.len(),
        };
        if accepted == 0 && !data.is_empty() {
            return Poll::Ready(Err(io::Error::other("injected write failure")));
        }
        buffer.extend_from_slice(&data[..accepted]);
        Poll::Ready(Ok(accepted))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
