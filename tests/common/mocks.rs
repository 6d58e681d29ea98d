#![allow(missing_docs, clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use cas_fs::attr;
use cas_fs::error::FsError;
use cas_fs::fs::{FileInfo, StoreFs};
use cas_fs::path::VirtualPath;

/// A node in the mock store tree.
#[derive(Debug, Clone)]
pub enum MockNode {
    Directory,
    File { mode: u32, data: Bytes },
    Symlink { target: String },
}

/// Shared state backing [`MockStore`].
#[derive(Debug, Default)]
pub struct MockStoreState {
    /// Canonical path string -> node.
    pub nodes: Mutex<HashMap<String, MockNode>>,

    pub stat_calls: AtomicUsize,
    pub read_dir_calls: AtomicUsize,
    pub read_file_calls: AtomicUsize,
    pub chunk_read_calls: AtomicUsize,

    /// `(path, mode)` for every `create_dir` call.
    pub create_dir_calls: Mutex<Vec<(String, u32)>>,
    /// `(dir, content_hash, name, mode)` for every `create_file` call.
    pub create_file_calls: Mutex<Vec<(String, String, String, u32)>>,
    /// Paths handed to `commit_modified_content`, in order.
    pub committed: Mutex<Vec<String>>,

    /// Paths whose `stat` fails with an internal error.
    pub failing_stats: Mutex<HashSet<String>>,
    /// When set, `read_dir` returns these raw names instead of real children.
    pub listing_override: Mutex<Option<Vec<String>>>,

    /// Sentinel codes returned by the mutation calls (0 success, -1 failure).
    pub unlink_result: AtomicI32,
    pub rmdir_result: AtomicI32,
    pub rename_result: AtomicI32,

    /// Extra latency injected into `read_dir`, letting tests overlap callers.
    pub read_dir_delay: Mutex<Option<Duration>>,
    /// When set, the first `read_dir` call never completes.
    pub hang_first_read_dir: AtomicBool,
    /// Report chunked-read support for every path.
    pub chunked_reading: AtomicBool,
}

/// A clonable in-memory [`StoreFs`] for bridge and cache tests.
#[derive(Debug, Clone, Default)]
pub struct MockStore {
    pub state: Arc<MockStoreState>,
}

impl MockStore {
    /// An empty store containing only the root directory.
    pub fn with_root() -> Self {
        let store = Self::default();
        store.add_dir("/");
        store
    }

    pub fn add_dir(&self, path: &str) {
        self.state
            .nodes
            .lock()
            .unwrap()
            .insert(path.to_owned(), MockNode::Directory);
    }

    pub fn add_file(&self, path: &str, data: &[u8]) {
        self.add_file_with_mode(path, attr::default_file_mode(), data);
    }

    pub fn add_file_with_mode(&self, path: &str, mode: u32, data: &[u8]) {
        self.state.nodes.lock().unwrap().insert(
            path.to_owned(),
            MockNode::File {
                mode,
                data: Bytes::copy_from_slice(data),
            },
        );
    }

    pub fn fail_stat_for(&self, path: &str) {
        self.state
            .failing_stats
            .lock()
            .unwrap()
            .insert(path.to_owned());
    }

    fn node(&self, path: &VirtualPath) -> Option<MockNode> {
        self.state.nodes.lock().unwrap().get(path.as_str()).cloned()
    }
}

#[async_trait]
impl StoreFs for MockStore {
    async fn stat(&self, path: &VirtualPath) -> Result<FileInfo, FsError> {
        self.state.stat_calls.fetch_add(1, Ordering::SeqCst);
        if self
            .state
            .failing_stats
            .lock()
            .unwrap()
            .contains(path.as_str())
        {
            return Err(FsError::Internal(format!("stat backend failure: {path}")));
        }
        match self.node(path) {
            Some(MockNode::Directory) => Ok(FileInfo::directory()),
            Some(MockNode::File { mode, data }) => Ok(FileInfo {
                mode,
                size: data.len() as u64,
            }),
            Some(MockNode::Symlink { target }) => Ok(FileInfo {
                mode: attr::mode::SYMLINK | 0o777,
                size: target.len() as u64,
            }),
            None => Err(FsError::NotFound(path.to_string())),
        }
    }

    async fn read_dir(&self, path: &VirtualPath) -> Result<Vec<String>, FsError> {
        let call = self.state.read_dir_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.state.hang_first_read_dir.load(Ordering::SeqCst) && call == 1 {
            std::future::pending::<()>().await;
        }
        let delay = *self.state.read_dir_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(names) = self.state.listing_override.lock().unwrap().clone() {
            return Ok(names);
        }
        match self.node(path) {
            Some(MockNode::Directory) => {
                let nodes = self.state.nodes.lock().unwrap();
                let mut children: Vec<String> = nodes
                    .keys()
                    .filter_map(|key| {
                        let candidate = VirtualPath::normalize(key);
                        (!candidate.is_root() && candidate.parent() == *path)
                            .then(|| candidate.file_name().to_owned())
                    })
                    .collect();
                children.sort();
                Ok(children)
            }
            Some(_) => Err(FsError::InvalidArgument(format!("not a directory: {path}"))),
            None => Err(FsError::NotFound(path.to_string())),
        }
    }

    async fn read_file(&self, path: &VirtualPath) -> Result<Bytes, FsError> {
        self.state.read_file_calls.fetch_add(1, Ordering::SeqCst);
        match self.node(path) {
            Some(MockNode::File { data, .. }) => Ok(data),
            Some(_) => Err(FsError::InvalidArgument(format!("not a file: {path}"))),
            None => Err(FsError::NotFound(path.to_string())),
        }
    }

    async fn read_file_chunk(
        &self,
        path: &VirtualPath,
        length: u64,
        offset: u64,
    ) -> Result<Bytes, FsError> {
        self.state.chunk_read_calls.fetch_add(1, Ordering::SeqCst);
        match self.node(path) {
            Some(MockNode::File { data, .. }) => {
                let start = usize::try_from(offset).unwrap().min(data.len());
                let end = start
                    .saturating_add(usize::try_from(length).unwrap())
                    .min(data.len());
                Ok(data.slice(start..end))
            }
            Some(_) => Err(FsError::InvalidArgument(format!("not a file: {path}"))),
            None => Err(FsError::NotFound(path.to_string())),
        }
    }

    async fn supports_chunked_reading(&self, _path: &VirtualPath) -> bool {
        self.state.chunked_reading.load(Ordering::SeqCst)
    }

    async fn create_dir(&self, path: &VirtualPath, mode: u32) -> Result<(), FsError> {
        self.state
            .create_dir_calls
            .lock()
            .unwrap()
            .push((path.to_string(), mode));
        self.add_dir(path.as_str());
        Ok(())
    }

    async fn create_file(
        &self,
        dir: &VirtualPath,
        content_hash: &str,
        name: &str,
        mode: u32,
    ) -> Result<(), FsError> {
        self.state.create_file_calls.lock().unwrap().push((
            dir.to_string(),
            content_hash.to_owned(),
            name.to_owned(),
            mode,
        ));
        self.add_file_with_mode(dir.join(name).as_str(), mode, b"");
        Ok(())
    }

    async fn unlink(&self, path: &VirtualPath) -> Result<i32, FsError> {
        let code = self.state.unlink_result.load(Ordering::SeqCst);
        if code == 0 {
            self.state.nodes.lock().unwrap().remove(path.as_str());
        }
        Ok(code)
    }

    async fn rmdir(&self, path: &VirtualPath) -> Result<i32, FsError> {
        let code = self.state.rmdir_result.load(Ordering::SeqCst);
        if code == 0 {
            self.state.nodes.lock().unwrap().remove(path.as_str());
        }
        Ok(code)
    }

    async fn rename(&self, src: &VirtualPath, dest: &VirtualPath) -> Result<i32, FsError> {
        let code = self.state.rename_result.load(Ordering::SeqCst);
        if code == 0 {
            let mut nodes = self.state.nodes.lock().unwrap();
            let moved: Vec<(String, MockNode)> = nodes
                .iter()
                .filter(|(key, _)| {
                    let candidate = VirtualPath::normalize(key);
                    candidate == *src || candidate.is_strict_descendant_of(src)
                })
                .map(|(key, node)| (key.clone(), node.clone()))
                .collect();
            for (key, node) in moved {
                nodes.remove(&key);
                let suffix = &key[src.as_str().len()..];
                nodes.insert(format!("{dest}{suffix}"), node);
            }
        }
        Ok(code)
    }

    async fn chmod(&self, path: &VirtualPath, mode: u32) -> Result<i32, FsError> {
        let mut nodes = self.state.nodes.lock().unwrap();
        match nodes.get_mut(path.as_str()) {
            Some(MockNode::File { mode: m, .. }) => {
                *m = mode;
                Ok(0)
            }
            Some(_) => Ok(0),
            None => Ok(-1),
        }
    }

    async fn symlink(&self, target: &str, link: &VirtualPath) -> Result<(), FsError> {
        self.state.nodes.lock().unwrap().insert(
            link.to_string(),
            MockNode::Symlink {
                target: target.to_owned(),
            },
        );
        Ok(())
    }

    async fn read_link(&self, path: &VirtualPath) -> Result<String, FsError> {
        match self.node(path) {
            Some(MockNode::Symlink { target }) => Ok(target),
            Some(_) => Err(FsError::InvalidArgument(format!("not a symlink: {path}"))),
            None => Err(FsError::NotFound(path.to_string())),
        }
    }

    /// Materializes the committed file when absent, simulating scratch
    /// content landing in the store, and returns a deterministic hash.
    async fn commit_modified_content(&self, path: &VirtualPath) -> Result<String, FsError> {
        let mut committed = self.state.committed.lock().unwrap();
        committed.push(path.to_string());
        let hash = format!("h{:04}", committed.len());
        drop(committed);

        let mut nodes = self.state.nodes.lock().unwrap();
        nodes.entry(path.to_string()).or_insert_with(|| MockNode::File {
            mode: attr::default_file_mode(),
            data: Bytes::new(),
        });
        Ok(hash)
    }
}
