//! Deduplication of concurrent directory enumerations.
//!
//! The host driver may fan out many simultaneous enumeration requests for
//! the same path. At most one real listing read runs per path at any
//! instant; followers wait on a per-path completion signal with a bounded
//! timeout and then fall back to their own read — the bound abandons the
//! wait, never the in-flight read.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::debug;

use crate::path::VirtualPath;

/// Outcome of [`EnumerationCoordinator::claim`].
pub enum Claim<'a> {
    /// This caller owns the read. Dropping the guard — after storing the
    /// result, or on error/cancellation — releases the marker and wakes
    /// waiters, so a failed winner can never wedge its followers.
    Winner(ClaimGuard<'a>),
    /// Another caller held the claim; its read completed or the wait bound
    /// elapsed. Re-check the cache and fall back to an own read on a miss.
    Waited,
}

/// Ensures at most one in-flight enumeration per path.
pub struct EnumerationCoordinator {
    in_flight: scc::HashMap<VirtualPath, Arc<Notify>>,
    wait_bound: Duration,
}

impl EnumerationCoordinator {
    #[must_use]
    pub fn new(wait_bound: Duration) -> Self {
        Self {
            in_flight: scc::HashMap::new(),
            wait_bound,
        }
    }

    /// Claim the in-flight marker for `path`, or wait for its holder.
    pub async fn claim(&self, path: &VirtualPath) -> Claim<'_> {
        let signal = match self.in_flight.entry_async(path.clone()).await {
            scc::hash_map::Entry::Vacant(vac) => {
                vac.insert_entry(Arc::new(Notify::new()));
                return Claim::Winner(ClaimGuard {
                    coordinator: self,
                    path: path.clone(),
                });
            }
            scc::hash_map::Entry::Occupied(occ) => Arc::clone(occ.get()),
        };

        // Register interest before re-checking the marker, so a completion
        // between the two cannot be missed.
        let notified = signal.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if !self.in_flight.contains_async(path).await {
            return Claim::Waited;
        }
        if tokio::time::timeout(self.wait_bound, notified).await.is_err() {
            debug!(%path, "enumeration wait bound elapsed, proceeding with own read");
        }
        Claim::Waited
    }

    /// Forget every in-flight marker, waking all waiters.
    ///
    /// Used by the warm-start pre-population so it always performs fresh
    /// reads instead of inheriting stale claims.
    pub async fn reset(&self) {
        let mut paths = Vec::new();
        self.in_flight
            .iter_async(|key, _| {
                paths.push(key.clone());
                true
            })
            .await;
        for path in paths {
            self.release(&path);
        }
    }

    fn release(&self, path: &VirtualPath) {
        if let Some((_, signal)) = self.in_flight.remove_sync(path) {
            signal.notify_waiters();
        }
    }
}

/// RAII claim held by the single in-flight reader for a path.
pub struct ClaimGuard<'a> {
    coordinator: &'a EnumerationCoordinator,
    path: VirtualPath,
}

impl Drop for ClaimGuard<'_> {
    /// Fires on normal completion and on cancellation alike, releasing the
    /// marker and waking waiters. Waiters re-check the cache; if the
    /// winner failed, the cache is still empty and they read on their own.
    fn drop(&mut self) {
        self.coordinator.release(&self.path);
    }
}
