//! The abstract filesystem capability consumed by the bridge.
//!
//! The content-addressed store and its higher-level views sit behind
//! [`StoreFs`]; the bridge never sees hashes, versions, or persistence —
//! only this narrow stat/read/readdir/mutate contract.

use async_trait::async_trait;
use bytes::Bytes;

use crate::attr;
use crate::error::FsError;
use crate::path::VirtualPath;

/// Result of a [`StoreFs::stat`] call: type + permission bits and size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileInfo {
    pub mode: u32,
    pub size: u64,
}

impl FileInfo {
    /// A regular file with the default mode.
    #[must_use]
    pub fn regular(size: u64) -> Self {
        Self {
            mode: attr::default_file_mode(),
            size,
        }
    }

    /// A directory with the default mode.
    #[must_use]
    pub fn directory() -> Self {
        Self {
            mode: attr::default_directory_mode(),
            size: 0,
        }
    }

    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.mode & attr::mode::TYPE_MASK == attr::mode::DIRECTORY
    }

    #[must_use]
    pub fn is_symlink(&self) -> bool {
        self.mode & attr::mode::TYPE_MASK == attr::mode::SYMLINK
    }

    #[must_use]
    pub fn is_readonly(&self) -> bool {
        self.mode & attr::mode::OWNER_WRITE == 0
    }
}

/// A named child inside a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: String,
    pub info: FileInfo,
}

/// Abstract content-store filesystem that the bridge projects.
///
/// All calls are asynchronous I/O; the bridge suspends while awaiting them
/// and never holds a lock across a call. The mutation operations
/// (`unlink`/`rmdir`/`rename`/`chmod`) signal failure with a `0`/`-1`
/// sentinel return code rather than an error; the bridge converts the
/// sentinel into a raised error so every failure path looks uniform to the
/// host.
#[async_trait]
pub trait StoreFs: Send + Sync + 'static {
    async fn stat(&self, path: &VirtualPath) -> Result<FileInfo, FsError>;

    /// List the child names of a directory.
    async fn read_dir(&self, path: &VirtualPath) -> Result<Vec<String>, FsError>;

    /// Read an entire file.
    async fn read_file(&self, path: &VirtualPath) -> Result<Bytes, FsError>;

    /// Read `length` bytes at `offset` without materializing the whole blob.
    ///
    /// Only called when [`supports_chunked_reading`](Self::supports_chunked_reading)
    /// reported `true` for the path.
    async fn read_file_chunk(
        &self,
        path: &VirtualPath,
        length: u64,
        offset: u64,
    ) -> Result<Bytes, FsError>;

    async fn supports_chunked_reading(&self, path: &VirtualPath) -> bool;

    async fn create_dir(&self, path: &VirtualPath, mode: u32) -> Result<(), FsError>;

    /// Materialize a file entry in `dir` pointing at already-stored content.
    async fn create_file(
        &self,
        dir: &VirtualPath,
        content_hash: &str,
        name: &str,
        mode: u32,
    ) -> Result<(), FsError>;

    /// Returns `0` on success, `-1` on failure.
    async fn unlink(&self, path: &VirtualPath) -> Result<i32, FsError>;

    /// Returns `0` on success, `-1` on failure.
    async fn rmdir(&self, path: &VirtualPath) -> Result<i32, FsError>;

    /// Returns `0` on success, `-1` on failure.
    async fn rename(&self, src: &VirtualPath, dest: &VirtualPath) -> Result<i32, FsError>;

    /// Returns `0` on success, `-1` on failure.
    async fn chmod(&self, path: &VirtualPath, mode: u32) -> Result<i32, FsError>;

    async fn symlink(&self, target: &str, link: &VirtualPath) -> Result<(), FsError>;

    async fn read_link(&self, path: &VirtualPath) -> Result<String, FsError>;

    /// Persist host-modified scratch content for `path` into the store,
    /// returning the new content hash.
    ///
    /// This is the integration point for scratch-content persistence; the
    /// bridge invokes it on a modified-close notification and logs the
    /// outcome without failing the notification.
    async fn commit_modified_content(&self, path: &VirtualPath) -> Result<String, FsError>;
}
