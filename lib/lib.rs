//! cas-fs shared library.
//!
//! Projects a content-addressed object store into native OS file
//! explorers. Host virtualization callbacks are translated into calls
//! against an abstract [`fs::StoreFs`] collaborator, with TTL- and
//! budget-bounded caching and per-path enumeration deduplication in
//! between.

/// POSIX mode ↔ host attribute translation.
pub mod attr;
/// Host-callback bridge over the abstract store filesystem.
pub mod bridge;
/// TTL- and budget-bounded caches for metadata, listings, and content.
pub mod cache;
/// Bridge configuration.
pub mod config;
/// Deduplication of concurrent directory enumerations.
pub mod enumeration;
/// Error taxonomy and host error conversion.
pub mod error;
/// The abstract filesystem capability consumed by the bridge.
pub mod fs;
/// Host-side binding: session lifecycle, dispatch, front-ends.
pub mod host;
/// Canonical virtual path grammar and host path mapping.
pub mod path;
/// Monotonic bridge counters and statistics snapshots.
pub mod stats;
/// Tracing configuration and initialization.
pub mod trc;
