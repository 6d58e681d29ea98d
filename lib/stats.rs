//! Monotonic bridge counters and the point-in-time statistics snapshot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::cache::CacheStats;

/// Request and byte counters maintained by the bridge.
///
/// All methods take `&self`; counters only ever increase.
#[derive(Debug, Default)]
pub struct BridgeStats {
    placeholder_requests: AtomicU64,
    file_data_requests: AtomicU64,
    enumeration_requests: AtomicU64,
    file_modifications: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
}

impl BridgeStats {
    pub fn record_placeholder_request(&self) {
        self.placeholder_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_file_data_request(&self) {
        self.file_data_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_enumeration_request(&self) {
        self.enumeration_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_file_modification(&self) {
        self.file_modifications.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bytes_read(&self, count: u64) {
        self.bytes_read.fetch_add(count, Ordering::Relaxed);
    }

    /// Bytes flushed back into the store. Advanced by the scratch-content
    /// persistence integration behind
    /// [`StoreFs::commit_modified_content`](crate::fs::StoreFs::commit_modified_content).
    pub fn record_bytes_written(&self, count: u64) {
        self.bytes_written.fetch_add(count, Ordering::Relaxed);
    }

    /// Combine the counters with cache statistics into a snapshot.
    #[must_use]
    pub fn snapshot(&self, cache: &CacheStats, uptime: Option<Duration>) -> Statistics {
        Statistics {
            placeholder_requests: self.placeholder_requests.load(Ordering::Relaxed),
            file_data_requests: self.file_data_requests.load(Ordering::Relaxed),
            enumeration_requests: self.enumeration_requests.load(Ordering::Relaxed),
            file_modifications: self.file_modifications.load(Ordering::Relaxed),
            cache_hits: cache.hits,
            cache_misses: cache.misses,
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            uptime,
        }
    }
}

/// Point-in-time view of the statistics surface.
///
/// Every field except `uptime` is a monotonic counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Statistics {
    pub placeholder_requests: u64,
    pub file_data_requests: u64,
    pub enumeration_requests: u64,
    pub file_modifications: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    /// Time since the session started; `None` when not running.
    pub uptime: Option<Duration>,
}
