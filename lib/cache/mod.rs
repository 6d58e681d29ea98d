//! TTL- and budget-bounded caches for metadata, listings, and content.
//!
//! One [`CacheManager`] instance exists per mount. The backing maps are
//! [`scc::HashMap`]s, so puts, gets, and invalidations are atomic per key
//! without any lock spanning unrelated paths — the host driver fans out
//! many concurrent independent requests and must never serialize on the
//! cache.

mod content;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::trace;

use crate::fs::{DirEntryInfo, FileInfo};
use crate::path::VirtualPath;

use content::ChunkRuns;

/// Nominal bookkeeping cost charged per entry on top of payload bytes.
const ENTRY_OVERHEAD: u64 = 64;

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    size: u64,
}

/// Snapshot of cache counters and occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub file_info_entries: usize,
    pub listing_entries: usize,
    pub content_entries: usize,
    pub total_bytes: u64,
}

/// TTL- and budget-bounded cache of per-path metadata, per-directory
/// listings, and per-offset content runs, with subtree invalidation.
pub struct CacheManager {
    file_info: scc::HashMap<VirtualPath, Entry<FileInfo>>,
    listings: scc::HashMap<VirtualPath, Entry<Arc<Vec<DirEntryInfo>>>>,
    contents: scc::HashMap<VirtualPath, Entry<ChunkRuns>>,
    budget: u64,
    ttl: Duration,
    total_bytes: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheManager {
    /// Create a cache bounded by `budget` total bytes with the given
    /// per-entry time-to-live.
    #[must_use]
    pub fn new(budget: u64, ttl: Duration) -> Self {
        Self {
            file_info: scc::HashMap::new(),
            listings: scc::HashMap::new(),
            contents: scc::HashMap::new(),
            budget,
            ttl,
            total_bytes: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub async fn put_file_info(&self, path: VirtualPath, info: FileInfo) {
        let size = path.as_str().len() as u64 + ENTRY_OVERHEAD;
        store(&self.file_info, &self.total_bytes, path, info, size).await;
        self.enforce_budget().await;
    }

    pub async fn get_file_info(&self, path: &VirtualPath) -> Option<FileInfo> {
        self.fetch(&self.file_info, path, |entry| entry.value).await
    }

    pub async fn put_directory_listing(&self, path: VirtualPath, entries: Vec<DirEntryInfo>) {
        let size = path.as_str().len() as u64
            + entries
                .iter()
                .map(|e| e.name.len() as u64 + ENTRY_OVERHEAD)
                .sum::<u64>()
            + ENTRY_OVERHEAD;
        store(&self.listings, &self.total_bytes, path, Arc::new(entries), size).await;
        self.enforce_budget().await;
    }

    pub async fn get_directory_listing(
        &self,
        path: &VirtualPath,
    ) -> Option<Arc<Vec<DirEntryInfo>>> {
        self.fetch(&self.listings, path, |entry| Arc::clone(&entry.value))
            .await
    }

    /// Cache a content range, merging it with adjacent or overlapping
    /// ranges already stored for the path. Refreshes the entry's age.
    pub async fn put_file_content(&self, path: VirtualPath, offset: u64, data: Bytes) {
        if data.is_empty() {
            return;
        }
        let path_cost = path.as_str().len() as u64 + ENTRY_OVERHEAD;
        match self.contents.entry_async(path).await {
            scc::hash_map::Entry::Occupied(mut occ) => {
                let entry = occ.get_mut();
                let old_size = entry.size;
                entry.value.insert(offset, data);
                entry.inserted_at = Instant::now();
                entry.size = entry.value.total_len() + path_cost;
                adjust_total(&self.total_bytes, old_size, entry.size);
            }
            scc::hash_map::Entry::Vacant(vac) => {
                let mut runs = ChunkRuns::default();
                runs.insert(offset, data);
                let size = runs.total_len() + path_cost;
                vac.insert_entry(Entry {
                    value: runs,
                    inserted_at: Instant::now(),
                    size,
                });
                self.total_bytes.fetch_add(size, Ordering::Relaxed);
            }
        }
        self.enforce_budget().await;
    }

    /// Return the exact bytes for `[offset, offset + length)` if fully
    /// covered by cached runs; a gap anywhere is a miss, never a partial
    /// result.
    pub async fn get_file_content(
        &self,
        path: &VirtualPath,
        offset: u64,
        length: u64,
    ) -> Option<Bytes> {
        let read = self
            .contents
            .read_async(path, |_, entry| {
                (entry.value.read(offset, length), entry.inserted_at)
            })
            .await;
        match read {
            Some((covered, inserted_at)) if inserted_at.elapsed() <= self.ttl => match covered {
                Some(data) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    Some(data)
                }
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    None
                }
            },
            Some((_, inserted_at)) => {
                self.drop_entry(&self.contents, path, inserted_at);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Remove the cached entries for `path` and for every strict
    /// descendant of `path`, across all three caches.
    pub async fn invalidate_path(&self, path: &VirtualPath) {
        self.invalidate_in(&self.file_info, path).await;
        self.invalidate_in(&self.listings, path).await;
        self.invalidate_in(&self.contents, path).await;
    }

    /// Remove only the cached directory listing for `path` (children keep
    /// their own entries).
    pub async fn invalidate_directory_listing(&self, path: &VirtualPath) {
        if let Some((_, entry)) = self.listings.remove_async(path).await {
            self.total_bytes.fetch_sub(entry.size, Ordering::Relaxed);
        }
    }

    /// Drop every cached entry. Hit/miss counters are preserved.
    pub async fn clear(&self) {
        let root = VirtualPath::root();
        self.invalidate_in(&self.file_info, &root).await;
        self.invalidate_in(&self.listings, &root).await;
        self.invalidate_in(&self.contents, &root).await;
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            file_info_entries: self.file_info.len(),
            listing_entries: self.listings.len(),
            content_entries: self.contents.len(),
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
        }
    }

    /// Read a fresh entry, counting a hit; expired entries are removed and
    /// counted as misses.
    async fn fetch<V, T>(
        &self,
        map: &scc::HashMap<VirtualPath, Entry<V>>,
        path: &VirtualPath,
        project: impl FnOnce(&Entry<V>) -> T,
    ) -> Option<T> {
        let read = map
            .read_async(path, |_, entry| (project(entry), entry.inserted_at))
            .await;
        match read {
            Some((value, inserted_at)) if inserted_at.elapsed() <= self.ttl => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Some((_, inserted_at)) => {
                self.drop_entry(map, path, inserted_at);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Remove an entry observed at `seen_at`, guarding against racing a
    /// fresh overwrite.
    fn drop_entry<V>(
        &self,
        map: &scc::HashMap<VirtualPath, Entry<V>>,
        path: &VirtualPath,
        seen_at: Instant,
    ) {
        if let Some((_, entry)) = map.remove_if_sync(path, |entry| entry.inserted_at == seen_at) {
            self.total_bytes.fetch_sub(entry.size, Ordering::Relaxed);
            trace!(%path, "dropped cache entry");
        }
    }

    async fn invalidate_in<V>(
        &self,
        map: &scc::HashMap<VirtualPath, Entry<V>>,
        path: &VirtualPath,
    ) {
        let mut victims = Vec::new();
        map.iter_async(|key, _| {
            if key == path || key.is_strict_descendant_of(path) {
                victims.push(key.clone());
            }
            true
        })
        .await;
        for victim in victims {
            if let Some((_, entry)) = map.remove_async(&victim).await {
                self.total_bytes.fetch_sub(entry.size, Ordering::Relaxed);
            }
        }
    }

    /// When the byte budget is exceeded, evict entries in ascending
    /// insertion-time order, removing TTL-expired entries along the way
    /// regardless of budget pressure.
    async fn enforce_budget(&self) {
        if self.total_bytes.load(Ordering::Relaxed) <= self.budget {
            return;
        }

        let mut candidates: Vec<(Kind, VirtualPath, Instant)> = Vec::new();
        self.file_info
            .iter_async(|key, entry| {
                candidates.push((Kind::FileInfo, key.clone(), entry.inserted_at));
                true
            })
            .await;
        self.listings
            .iter_async(|key, entry| {
                candidates.push((Kind::Listing, key.clone(), entry.inserted_at));
                true
            })
            .await;
        self.contents
            .iter_async(|key, entry| {
                candidates.push((Kind::Content, key.clone(), entry.inserted_at));
                true
            })
            .await;

        candidates.sort_by_key(|(_, _, inserted_at)| *inserted_at);

        for (kind, path, inserted_at) in candidates {
            let over_budget = self.total_bytes.load(Ordering::Relaxed) > self.budget;
            let expired = inserted_at.elapsed() > self.ttl;
            if !over_budget && !expired {
                break;
            }
            match kind {
                Kind::FileInfo => self.drop_entry(&self.file_info, &path, inserted_at),
                Kind::Listing => self.drop_entry(&self.listings, &path, inserted_at),
                Kind::Content => self.drop_entry(&self.contents, &path, inserted_at),
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    FileInfo,
    Listing,
    Content,
}

fn adjust_total(total: &AtomicU64, old_size: u64, new_size: u64) {
    if old_size <= new_size {
        total.fetch_add(new_size - old_size, Ordering::Relaxed);
    } else {
        total.fetch_sub(old_size - new_size, Ordering::Relaxed);
    }
}

async fn store<V>(
    map: &scc::HashMap<VirtualPath, Entry<V>>,
    total: &AtomicU64,
    path: VirtualPath,
    value: V,
    size: u64,
) {
    match map.entry_async(path).await {
        scc::hash_map::Entry::Occupied(mut occ) => {
            let entry = occ.get_mut();
            let old_size = entry.size;
            entry.value = value;
            entry.inserted_at = Instant::now();
            entry.size = size;
            adjust_total(total, old_size, size);
        }
        scc::hash_map::Entry::Vacant(vac) => {
            vac.insert_entry(Entry {
                value,
                inserted_at: Instant::now(),
                size,
            });
            total.fetch_add(size, Ordering::Relaxed);
        }
    }
}
