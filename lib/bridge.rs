//! Host-callback bridge over the abstract store filesystem.
//!
//! Implements the host virtualization callback set by consulting the path
//! mapper, attribute converter, cache manager, enumeration coordinator,
//! and the [`StoreFs`] collaborator. Collaborator errors are classified at
//! this boundary; sentinel return codes are converted into raised errors
//! so every failure path looks uniform to the host.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use rustc_hash::FxHashSet;
use tracing::{debug, instrument, warn};

use crate::attr::{self, HostAttributes};
use crate::cache::CacheManager;
use crate::config::BridgeConfig;
use crate::enumeration::{Claim, EnumerationCoordinator};
use crate::error::FsError;
use crate::fs::{DirEntryInfo, FileInfo, StoreFs};
use crate::path::{PathMapper, VirtualPath, matches_pattern};
use crate::stats::{BridgeStats, Statistics};

/// Metadata handed to the host for a placeholder entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaceholderInfo {
    pub info: FileInfo,
    pub attributes: HostAttributes,
}

/// Translates host callbacks into [`StoreFs`] calls.
///
/// Safe for concurrent use: the host driver dispatches callbacks from its
/// own worker pool, potentially many at once for the same path. No lock is
/// held across a collaborator call.
pub struct BridgeAdapter<S: StoreFs> {
    store: Arc<S>,
    mapper: PathMapper,
    cache: Arc<CacheManager>,
    enumerations: EnumerationCoordinator,
    stats: Arc<BridgeStats>,
    case_insensitive_names: bool,
    warm_start: bool,
}

impl<S: StoreFs> BridgeAdapter<S> {
    #[must_use]
    pub fn new(store: Arc<S>, config: &BridgeConfig) -> Self {
        Self {
            store,
            mapper: PathMapper::new(config.virtualization_root.clone()),
            cache: Arc::new(CacheManager::new(
                config.cache.max_size.as_u64(),
                config.cache.entry_ttl(),
            )),
            enumerations: EnumerationCoordinator::new(config.enumeration.wait_bound()),
            stats: Arc::new(BridgeStats::default()),
            case_insensitive_names: config.case_insensitive_names,
            warm_start: config.enumeration.warm_start,
        }
    }

    #[must_use]
    pub fn virtualization_root(&self) -> &Path {
        self.mapper.virtualization_root()
    }

    #[must_use]
    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    #[must_use]
    pub fn stats_snapshot(&self, uptime: Option<Duration>) -> Statistics {
        self.stats.snapshot(&self.cache.stats(), uptime)
    }

    pub(crate) fn warm_start_enabled(&self) -> bool {
        self.warm_start
    }

    /// Serve a get-placeholder-info callback.
    #[instrument(name = "BridgeAdapter::get_placeholder_info", skip(self))]
    pub async fn get_placeholder_info(&self, rel_path: &str) -> Result<PlaceholderInfo, FsError> {
        self.stats.record_placeholder_request();
        let path = self.mapper.to_virtual_path(rel_path)?;

        if let Some(info) = self.cache.get_file_info(&path).await {
            return Ok(placeholder(&path, info));
        }

        let info = self.store.stat(&path).await?;
        self.cache.put_file_info(path.clone(), info).await;
        Ok(placeholder(&path, info))
    }

    /// Serve a get-file-data callback for `[offset, offset + length)`.
    ///
    /// On a cache miss, paths with chunked-read support are read through
    /// the chunked entry point so a large blob is never materialized
    /// whole; otherwise the full file is read and sliced.
    #[instrument(name = "BridgeAdapter::get_file_data", skip(self))]
    pub async fn get_file_data(
        &self,
        rel_path: &str,
        offset: u64,
        length: u64,
    ) -> Result<Bytes, FsError> {
        self.stats.record_file_data_request();
        let path = self.mapper.to_virtual_path(rel_path)?;

        if let Some(data) = self.cache.get_file_content(&path, offset, length).await {
            self.stats.record_bytes_read(data.len() as u64);
            return Ok(data);
        }

        let data = if self.store.supports_chunked_reading(&path).await {
            self.store.read_file_chunk(&path, length, offset).await?
        } else {
            let whole = self.store.read_file(&path).await?;
            slice_range(&whole, offset, length)
        };

        self.cache
            .put_file_content(path, offset, data.clone())
            .await;
        self.stats.record_bytes_read(data.len() as u64);
        Ok(data)
    }

    /// Resolve a symlink's target string.
    #[instrument(name = "BridgeAdapter::read_symlink_target", skip(self))]
    pub async fn read_symlink_target(&self, rel_path: &str) -> Result<String, FsError> {
        let path = self.mapper.to_virtual_path(rel_path)?;
        self.store.read_link(&path).await
    }

    /// Serve a get-directory-enumeration callback.
    ///
    /// The full unfiltered listing is cached; the pattern filter is
    /// applied on the way out. Concurrent requests for the same path are
    /// deduplicated down to a single collaborator read.
    #[instrument(name = "BridgeAdapter::get_directory_enumeration", skip(self))]
    pub async fn get_directory_enumeration(
        &self,
        rel_path: &str,
        pattern: Option<&str>,
    ) -> Result<Vec<DirEntryInfo>, FsError> {
        self.stats.record_enumeration_request();
        let path = self.mapper.to_virtual_path(rel_path)?;

        if let Some(listing) = self.cache.get_directory_listing(&path).await {
            return Ok(filter(&listing, pattern));
        }

        let listing = match self.enumerations.claim(&path).await {
            Claim::Winner(guard) => {
                let listing = self.read_listing(&path).await?;
                self.cache
                    .put_directory_listing(path.clone(), listing.clone())
                    .await;
                drop(guard);
                listing
            }
            Claim::Waited => {
                if let Some(listing) = self.cache.get_directory_listing(&path).await {
                    return Ok(filter(&listing, pattern));
                }
                // The in-flight read failed or outlived the wait bound.
                let listing = self.read_listing(&path).await?;
                self.cache
                    .put_directory_listing(path.clone(), listing.clone())
                    .await;
                listing
            }
        };

        Ok(filter(&listing, pattern))
    }

    /// Serve a handle-closed notification for a modified or deleted entry.
    ///
    /// Directories only invalidate cache state here — directory deletion
    /// arrives through the explicit pre-delete hook. Deleted files are
    /// unlinked from the store; modified files go through the
    /// scratch-content persistence integration point. The path and its
    /// parent listing are invalidated on every outcome.
    #[instrument(
        name = "BridgeAdapter::notify_file_handle_closed_modified",
        skip(self)
    )]
    pub async fn notify_file_handle_closed_modified(
        &self,
        rel_path: &str,
        is_directory: bool,
        is_deleted: bool,
    ) -> Result<(), FsError> {
        self.stats.record_file_modification();
        let path = self.mapper.to_virtual_path(rel_path)?;

        let outcome = if is_directory {
            Ok(())
        } else if is_deleted {
            check_sentinel(self.store.unlink(&path).await, || {
                format!("Failed to delete file '{path}'")
            })
        } else {
            match self.store.commit_modified_content(&path).await {
                Ok(hash) => debug!(%path, %hash, "committed modified content"),
                Err(e) => warn!(%path, error = %e, "modified content not persisted"),
            }
            Ok(())
        };

        self.cache.invalidate_path(&path).await;
        self.cache.invalidate_directory_listing(&path.parent()).await;
        outcome
    }

    /// Serve a renamed notification, invalidating both paths and both
    /// parent listings (once, when the parents coincide).
    #[instrument(name = "BridgeAdapter::notify_renamed", skip(self))]
    pub async fn notify_renamed(
        &self,
        src_rel_path: &str,
        dest_rel_path: &str,
        is_directory: bool,
    ) -> Result<(), FsError> {
        self.stats.record_file_modification();
        let src = self.mapper.to_virtual_path(src_rel_path)?;
        let dest = self.mapper.to_virtual_path(dest_rel_path)?;

        let outcome = check_sentinel(self.store.rename(&src, &dest).await, || {
            format!("Failed to rename '{src}' to '{dest}'")
        });

        self.cache.invalidate_path(&src).await;
        self.cache.invalidate_path(&dest).await;
        let src_parent = src.parent();
        let dest_parent = dest.parent();
        self.cache.invalidate_directory_listing(&src_parent).await;
        if dest_parent != src_parent {
            self.cache.invalidate_directory_listing(&dest_parent).await;
        }
        outcome
    }

    /// Serve a new-file-created notification.
    ///
    /// Directories get their backing entry immediately; files defer
    /// backing creation until the modified-close notification, since no
    /// content exists yet at creation time.
    #[instrument(name = "BridgeAdapter::notify_new_file_created", skip(self))]
    pub async fn notify_new_file_created(
        &self,
        rel_path: &str,
        is_directory: bool,
    ) -> Result<(), FsError> {
        self.stats.record_file_modification();
        let path = self.mapper.to_virtual_path(rel_path)?;

        if is_directory {
            self.store.create_dir(&path, 0o755).await?;
        } else {
            debug!(%path, "deferring backing creation until content is available");
        }

        self.cache.invalidate_directory_listing(&path.parent()).await;
        Ok(())
    }

    /// Serve a pre-delete notification.
    #[instrument(name = "BridgeAdapter::notify_pre_delete", skip(self))]
    pub async fn notify_pre_delete(
        &self,
        rel_path: &str,
        is_directory: bool,
    ) -> Result<(), FsError> {
        self.stats.record_file_modification();
        let path = self.mapper.to_virtual_path(rel_path)?;

        let outcome = if is_directory {
            check_sentinel(self.store.rmdir(&path).await, || {
                format!("Failed to remove directory '{path}'")
            })
        } else {
            check_sentinel(self.store.unlink(&path).await, || {
                format!("Failed to delete file '{path}'")
            })
        };

        self.cache.invalidate_path(&path).await;
        self.cache.invalidate_directory_listing(&path.parent()).await;
        outcome
    }

    /// Pre-populate the enumeration cache before the host begins issuing
    /// on-demand requests: the root plus each of its top-level
    /// directories, always as fresh reads.
    #[instrument(name = "BridgeAdapter::warm_start", skip(self))]
    pub async fn warm_start(&self) {
        self.enumerations.reset().await;

        let root = VirtualPath::root();
        let listing = match self.read_listing(&root).await {
            Ok(listing) => listing,
            Err(e) => {
                warn!(error = %e, "warm start: root enumeration failed");
                return;
            }
        };
        self.cache
            .put_directory_listing(root.clone(), listing.clone())
            .await;

        for entry in listing.iter().filter(|e| e.info.is_directory()) {
            let child = root.join(&entry.name);
            match self.read_listing(&child).await {
                Ok(children) => {
                    self.cache.put_directory_listing(child, children).await;
                }
                Err(e) => warn!(dir = %entry.name, error = %e, "warm start: enumeration failed"),
            }
        }
    }

    /// Read a directory listing from the store, bypassing the cache.
    ///
    /// Children are stat-ed individually; a child whose stat fails is
    /// skipped and logged, never failing the whole enumeration. Duplicate
    /// names (under the configured folding policy) and names containing
    /// separators are dropped.
    async fn read_listing(&self, path: &VirtualPath) -> Result<Vec<DirEntryInfo>, FsError> {
        let names = self.store.read_dir(path).await?;
        let mut seen = FxHashSet::default();
        let mut entries = Vec::with_capacity(names.len());

        for name in names {
            if name.contains('/') || name.contains('\\') {
                warn!(%name, dir = %path, "dropping entry with separator in name");
                continue;
            }
            let folded = if self.case_insensitive_names {
                name.to_ascii_uppercase()
            } else {
                name.clone()
            };
            if !seen.insert(folded) {
                warn!(%name, dir = %path, "dropping duplicate directory entry");
                continue;
            }

            let child = path.join(&name);
            match self.store.stat(&child).await {
                Ok(info) => {
                    self.cache.put_file_info(child, info).await;
                    entries.push(DirEntryInfo { name, info });
                }
                Err(e) => {
                    warn!(%name, dir = %path, error = %e, "skipping child whose stat failed");
                }
            }
        }

        Ok(entries)
    }
}

/// Convert a `0`/`-1` sentinel result into a raised error with a
/// descriptive message; collaborator-raised errors pass through.
fn check_sentinel(
    result: Result<i32, FsError>,
    message: impl FnOnce() -> String,
) -> Result<(), FsError> {
    match result {
        Ok(code) if code != 0 => Err(FsError::Io(message())),
        Ok(_) => Ok(()),
        Err(e) => {
            if e.is_passthrough() {
                warn!(error = %e, "passing through unrecognized collaborator error");
            }
            Err(e)
        }
    }
}

fn placeholder(path: &VirtualPath, info: FileInfo) -> PlaceholderInfo {
    PlaceholderInfo {
        info,
        attributes: attr::attributes_for(info.mode, path.file_name()),
    }
}

fn filter(entries: &[DirEntryInfo], pattern: Option<&str>) -> Vec<DirEntryInfo> {
    entries
        .iter()
        .filter(|e| matches_pattern(&e.name, pattern))
        .cloned()
        .collect()
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "clamped offsets fit in usize on supported 64-bit platforms"
)]
fn slice_range(whole: &Bytes, offset: u64, length: u64) -> Bytes {
    let start = (offset.min(whole.len() as u64)) as usize;
    let end = (offset.saturating_add(length).min(whole.len() as u64)) as usize;
    whole.slice(start..end)
}
