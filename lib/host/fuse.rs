//! FUSE front-end: maps [`fuser::Filesystem`] callbacks to the path-based
//! bridge.
//!
//! The kernel speaks inodes; the bridge speaks canonical virtual paths. A
//! bidirectional inode⇄path table translates between the two address
//! spaces. Mappings are allocated on first resolution and retargeted on
//! rename.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use rustc_hash::FxHashMap;
use tracing::{debug, instrument, warn};

use crate::bridge::BridgeAdapter;
use crate::error::FsError;
use crate::fs::{FileInfo, StoreFs};
use crate::path::VirtualPath;

const BLOCK_SIZE: u32 = 4096;
const ATTR_TTL: Duration = Duration::from_secs(1);

/// Bidirectional inode⇄path mapping.
///
/// Two concurrent maps for lock-free reads; mutations touching both maps
/// are serialized by a coordination mutex to prevent cross-map
/// inconsistencies.
///
/// **Known limitation:** mappings are only removed on explicit delete and
/// rename, not on kernel `forget`, so the table grows with the set of
/// paths ever touched during a mount.
struct NodeTable {
    paths: scc::HashMap<u64, VirtualPath>,
    inodes: scc::HashMap<VirtualPath, u64>,
    next: AtomicU64,
    mu: Mutex<()>,
}

impl NodeTable {
    fn new() -> Self {
        let table = Self {
            paths: scc::HashMap::new(),
            inodes: scc::HashMap::new(),
            next: AtomicU64::new(fuser::FUSE_ROOT_ID + 1),
            mu: Mutex::new(()),
        };
        let root = VirtualPath::root();
        let _ = table.paths.insert_sync(fuser::FUSE_ROOT_ID, root.clone());
        let _ = table.inodes.insert_sync(root, fuser::FUSE_ROOT_ID);
        table
    }

    fn path_of(&self, ino: u64) -> Option<VirtualPath> {
        self.paths.read_sync(&ino, |_, path| path.clone())
    }

    /// Resolve a path to its inode, allocating one if unmapped.
    fn inode_for(&self, path: &VirtualPath) -> u64 {
        let _guard = self
            .mu
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match self.inodes.entry_sync(path.clone()) {
            scc::hash_map::Entry::Occupied(occ) => *occ.get(),
            scc::hash_map::Entry::Vacant(vac) => {
                let ino = self.next.fetch_add(1, Ordering::Relaxed);
                vac.insert_entry(ino);
                let _ = self.paths.insert_sync(ino, path.clone());
                ino
            }
        }
    }

    fn remove(&self, path: &VirtualPath) {
        let _guard = self
            .mu
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some((_, ino)) = self.inodes.remove_sync(path) {
            self.paths.remove_sync(&ino);
        }
    }

    /// Point the renamed node's inode at its new path and drop mappings
    /// for everything under the old path. Stale descendants are
    /// re-resolved by subsequent lookups.
    async fn retarget(&self, src: &VirtualPath, dest: &VirtualPath) {
        let mut stale = Vec::new();
        self.inodes
            .iter_async(|path, _| {
                if path.is_strict_descendant_of(src) {
                    stale.push(path.clone());
                }
                true
            })
            .await;

        let _guard = self
            .mu
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for path in stale {
            if let Some((_, ino)) = self.inodes.remove_sync(&path) {
                self.paths.remove_sync(&ino);
            }
        }
        if let Some((_, old_dest)) = self.inodes.remove_sync(dest) {
            self.paths.remove_sync(&old_dest);
        }
        if let Some((_, ino)) = self.inodes.remove_sync(src) {
            let _ = self.inodes.insert_sync(dest.clone(), ino);
            self.paths.upsert_sync(ino, dest.clone());
        }
    }
}

/// Convert bridge file info into the fuser attribute structure.
///
/// The store does not model timestamps; the epoch is reported, and the
/// kernel's short attribute TTL keeps staleness bounded.
#[expect(
    clippy::cast_possible_truncation,
    reason = "permission bits fit in u16 after masking"
)]
fn file_info_to_attr(ino: u64, info: FileInfo, uid: u32, gid: u32) -> fuser::FileAttr {
    let kind = if info.is_directory() {
        fuser::FileType::Directory
    } else if info.is_symlink() {
        fuser::FileType::Symlink
    } else {
        fuser::FileType::RegularFile
    };
    fuser::FileAttr {
        ino,
        size: info.size,
        blocks: info.size.div_ceil(512),
        atime: SystemTime::UNIX_EPOCH,
        mtime: SystemTime::UNIX_EPOCH,
        ctime: SystemTime::UNIX_EPOCH,
        crtime: SystemTime::UNIX_EPOCH,
        kind,
        perm: (info.mode & 0o7777) as u16,
        nlink: 1,
        uid,
        gid,
        rdev: 0,
        blksize: BLOCK_SIZE,
        flags: 0,
    }
}

/// Trait abstracting the `.error(errno)` method common to fuser replies.
trait FuseReply {
    fn error(self, errno: i32);
}

macro_rules! impl_fuse_reply {
    ($($ty:ty),* $(,)?) => {
        $(impl FuseReply for $ty {
            fn error(self, errno: i32) {
                // Calls the inherent fuser method (not this trait method).
                self.error(errno);
            }
        })*
    };
}

impl_fuse_reply!(
    fuser::ReplyEntry,
    fuser::ReplyAttr,
    fuser::ReplyOpen,
    fuser::ReplyData,
    fuser::ReplyEmpty,
);

/// Extension trait on `Result<T, FsError>` for FUSE reply handling.
///
/// Centralizes the error-logging + errno-reply path so each callback only
/// has to express its success path.
trait FuseResultExt<T> {
    fn fuse_reply<R: FuseReply>(self, reply: R, on_ok: impl FnOnce(T, R));
}

impl<T> FuseResultExt<T> for Result<T, FsError> {
    fn fuse_reply<R: FuseReply>(self, reply: R, on_ok: impl FnOnce(T, R)) {
        match self {
            Ok(val) => on_ok(val, reply),
            Err(e) => {
                debug!(error = %e, "replying error");
                reply.error(e.errno());
            }
        }
    }
}

/// Bridges the path-based [`BridgeAdapter`] to the [`fuser::Filesystem`]
/// trait, using a tokio runtime handle to block on async bridge calls.
pub struct FuseAdapter<S: StoreFs> {
    bridge: Arc<BridgeAdapter<S>>,
    nodes: NodeTable,
    open_files: FxHashMap<u64, VirtualPath>,
    next_fh: AtomicU64,
    runtime: tokio::runtime::Handle,
    uid: u32,
    gid: u32,
}

impl<S: StoreFs> FuseAdapter<S> {
    #[must_use]
    pub fn new(
        bridge: Arc<BridgeAdapter<S>>,
        runtime: tokio::runtime::Handle,
        uid: u32,
        gid: u32,
    ) -> Self {
        Self {
            bridge,
            nodes: NodeTable::new(),
            open_files: FxHashMap::default(),
            next_fh: AtomicU64::new(1),
            runtime,
            uid,
            gid,
        }
    }

    fn resolve_child(&self, parent: u64, name: &OsStr) -> Result<VirtualPath, FsError> {
        let parent_path = self
            .nodes
            .path_of(parent)
            .ok_or_else(|| FsError::NotFound(format!("unknown parent inode {parent}")))?;
        let name = name
            .to_str()
            .ok_or_else(|| FsError::InvalidArgument("non-UTF-8 entry name".to_owned()))?;
        Ok(parent_path.join(name))
    }
}

impl<S: StoreFs> fuser::Filesystem for FuseAdapter<S> {
    #[instrument(name = "FuseAdapter::lookup", skip(self, _req, reply))]
    fn lookup(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        reply: fuser::ReplyEntry,
    ) {
        self.runtime
            .block_on(async {
                let child = self.resolve_child(parent, name)?;
                let placeholder = self.bridge.get_placeholder_info(child.as_str()).await?;
                let ino = self.nodes.inode_for(&child);
                Ok::<_, FsError>((ino, placeholder.info))
            })
            .fuse_reply(reply, |(ino, info), reply| {
                let f_attr = file_info_to_attr(ino, info, self.uid, self.gid);
                reply.entry(&ATTR_TTL, &f_attr, 0);
            });
    }

    #[instrument(name = "FuseAdapter::getattr", skip(self, _req, _fh, reply))]
    fn getattr(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _fh: Option<u64>,
        reply: fuser::ReplyAttr,
    ) {
        self.runtime
            .block_on(async {
                let path = self
                    .nodes
                    .path_of(ino)
                    .ok_or_else(|| FsError::NotFound(format!("unknown inode {ino}")))?;
                let placeholder = self.bridge.get_placeholder_info(path.as_str()).await?;
                Ok::<_, FsError>(placeholder.info)
            })
            .fuse_reply(reply, |info, reply| {
                reply.attr(&ATTR_TTL, &file_info_to_attr(ino, info, self.uid, self.gid));
            });
    }

    #[instrument(name = "FuseAdapter::readdir", skip(self, _req, _fh, offset, reply))]
    fn readdir(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: fuser::ReplyDirectory,
    ) {
        let result = self.runtime.block_on(async {
            let path = self
                .nodes
                .path_of(ino)
                .ok_or_else(|| FsError::NotFound(format!("unknown inode {ino}")))?;
            let entries = self
                .bridge
                .get_directory_enumeration(path.as_str(), None)
                .await?;
            Ok::<_, FsError>((path, entries))
        });

        let (path, entries) = match result {
            Ok(val) => val,
            Err(e) => {
                debug!(error = %e, "replying error");
                reply.error(e.errno());
                return;
            }
        };

        #[expect(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            reason = "readdir offsets are small and non-negative"
        )]
        let skip = offset.max(0) as usize;
        for (i, entry) in entries.iter().enumerate().skip(skip) {
            let child_ino = self.nodes.inode_for(&path.join(&entry.name));
            let kind = if entry.info.is_directory() {
                fuser::FileType::Directory
            } else if entry.info.is_symlink() {
                fuser::FileType::Symlink
            } else {
                fuser::FileType::RegularFile
            };
            let Ok(next_offset) = i64::try_from(i + 1) else {
                warn!(index = i, "directory entry index too large for fuser");
                reply.error(libc::EIO);
                return;
            };
            if reply.add(child_ino, next_offset, kind, &entry.name) {
                break;
            }
        }
        reply.ok();
    }

    #[instrument(name = "FuseAdapter::open", skip(self, _req, _flags, reply))]
    fn open(&mut self, _req: &fuser::Request<'_>, ino: u64, _flags: i32, reply: fuser::ReplyOpen) {
        let Some(path) = self.nodes.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let fh = self.next_fh.fetch_add(1, Ordering::Relaxed);
        self.open_files.insert(fh, path);
        reply.opened(fh, 0);
    }

    #[instrument(
        name = "FuseAdapter::read",
        skip(self, _req, _ino, fh, offset, size, _flags, _lock_owner, reply)
    )]
    fn read(
        &mut self,
        _req: &fuser::Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: fuser::ReplyData,
    ) {
        let result = self.runtime.block_on(async {
            let path = self
                .open_files
                .get(&fh)
                .ok_or_else(|| FsError::InvalidArgument(format!("stale file handle {fh}")))?;
            self.bridge
                .get_file_data(path.as_str(), offset.cast_unsigned(), u64::from(size))
                .await
        });
        match result {
            Ok(data) => reply.data(&data),
            Err(e) => {
                debug!(error = %e, "replying error");
                reply.error(e.errno());
            }
        }
    }

    #[instrument(
        name = "FuseAdapter::release",
        skip(self, _req, _ino, fh, _flags, _lock_owner, _flush, reply)
    )]
    fn release(
        &mut self,
        _req: &fuser::Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: fuser::ReplyEmpty,
    ) {
        if self.open_files.remove(&fh).is_some() {
            reply.ok();
        } else {
            reply.error(libc::EBADF);
        }
    }

    #[instrument(name = "FuseAdapter::readlink", skip(self, _req, reply))]
    fn readlink(&mut self, _req: &fuser::Request<'_>, ino: u64, reply: fuser::ReplyData) {
        let result = self.runtime.block_on(async {
            let path = self
                .nodes
                .path_of(ino)
                .ok_or_else(|| FsError::NotFound(format!("unknown inode {ino}")))?;
            self.bridge.read_symlink_target(path.as_str()).await
        });
        match result {
            Ok(target) => reply.data(target.as_bytes()),
            Err(e) => {
                debug!(error = %e, "replying error");
                reply.error(e.errno());
            }
        }
    }

    #[instrument(name = "FuseAdapter::mkdir", skip(self, _req, _mode, _umask, reply))]
    fn mkdir(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: fuser::ReplyEntry,
    ) {
        self.runtime
            .block_on(async {
                let child = self.resolve_child(parent, name)?;
                self.bridge
                    .notify_new_file_created(child.as_str(), true)
                    .await?;
                let placeholder = self.bridge.get_placeholder_info(child.as_str()).await?;
                let ino = self.nodes.inode_for(&child);
                Ok::<_, FsError>((ino, placeholder.info))
            })
            .fuse_reply(reply, |(ino, info), reply| {
                reply.entry(&ATTR_TTL, &file_info_to_attr(ino, info, self.uid, self.gid), 0);
            });
    }

    #[instrument(
        name = "FuseAdapter::create",
        skip(self, _req, _mode, _umask, _flags, reply)
    )]
    fn create(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: fuser::ReplyCreate,
    ) {
        let runtime = self.runtime.clone();
        let result = runtime.block_on(async {
            let child = self.resolve_child(parent, name)?;
            self.bridge
                .notify_new_file_created(child.as_str(), false)
                .await?;
            let ino = self.nodes.inode_for(&child);
            let fh = self.next_fh.fetch_add(1, Ordering::Relaxed);
            self.open_files.insert(fh, child);
            Ok::<_, FsError>((ino, fh))
        });
        match result {
            Ok((ino, fh)) => {
                // Backing creation is deferred until content arrives, so no
                // stat is possible yet; report a default empty file.
                let info = FileInfo::regular(0);
                reply.created(
                    &ATTR_TTL,
                    &file_info_to_attr(ino, info, self.uid, self.gid),
                    0,
                    fh,
                    0,
                );
            }
            Err(e) => {
                debug!(error = %e, "replying error");
                reply.error(e.errno());
            }
        }
    }

    #[instrument(name = "FuseAdapter::unlink", skip(self, _req, reply))]
    fn unlink(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        reply: fuser::ReplyEmpty,
    ) {
        self.runtime
            .block_on(async {
                let child = self.resolve_child(parent, name)?;
                self.bridge.notify_pre_delete(child.as_str(), false).await?;
                self.nodes.remove(&child);
                Ok::<_, FsError>(())
            })
            .fuse_reply(reply, |(), reply| reply.ok());
    }

    #[instrument(name = "FuseAdapter::rmdir", skip(self, _req, reply))]
    fn rmdir(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        reply: fuser::ReplyEmpty,
    ) {
        self.runtime
            .block_on(async {
                let child = self.resolve_child(parent, name)?;
                self.bridge.notify_pre_delete(child.as_str(), true).await?;
                self.nodes.remove(&child);
                Ok::<_, FsError>(())
            })
            .fuse_reply(reply, |(), reply| reply.ok());
    }

    #[instrument(name = "FuseAdapter::rename", skip(self, _req, _flags, reply))]
    fn rename(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: fuser::ReplyEmpty,
    ) {
        self.runtime
            .block_on(async {
                let src = self.resolve_child(parent, name)?;
                let dest = self.resolve_child(newparent, newname)?;
                let is_directory = self
                    .bridge
                    .get_placeholder_info(src.as_str())
                    .await
                    .is_ok_and(|p| p.info.is_directory());
                self.bridge
                    .notify_renamed(src.as_str(), dest.as_str(), is_directory)
                    .await?;
                self.nodes.retarget(&src, &dest).await;
                Ok::<_, FsError>(())
            })
            .fuse_reply(reply, |(), reply| reply.ok());
    }
}

/// Mount the adapter at `mountpoint`, returning the background session.
///
/// Dropping the session unmounts.
pub fn spawn_mount<S: StoreFs>(
    adapter: FuseAdapter<S>,
    mountpoint: &Path,
) -> std::io::Result<fuser::BackgroundSession> {
    let options = [
        fuser::MountOption::FSName("cas-fs".to_owned()),
        fuser::MountOption::DefaultPermissions,
        fuser::MountOption::NoAtime,
    ];
    fuser::spawn_mount2(adapter, mountpoint, &options)
}
