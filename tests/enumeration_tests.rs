#![allow(clippy::unwrap_used, missing_docs)]

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use futures::future::join_all;

use cas_fs::bridge::BridgeAdapter;
use cas_fs::config::BridgeConfig;

use common::mocks::MockStore;

fn test_config() -> BridgeConfig {
    let mut config = BridgeConfig::new("/srv/cas/mnt");
    config.enumeration.warm_start = false;
    config
}

/// Five concurrent enumerations of the same path must collapse into a
/// single collaborator read.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_enumerations_deduplicate_to_one_read() {
    let store = MockStore::with_root();
    store.add_dir("/same");
    store.add_file("/same/a.txt", b"1");
    store.add_file("/same/b.txt", b"2");
    *store.state.read_dir_delay.lock().unwrap() = Some(Duration::from_millis(100));

    let bridge = Arc::new(BridgeAdapter::new(Arc::new(store.clone()), &test_config()));

    let tasks = (0..5).map(|_| {
        let bridge = Arc::clone(&bridge);
        tokio::spawn(async move {
            bridge
                .get_directory_enumeration("same", None)
                .await
                .unwrap()
        })
    });
    let results = join_all(tasks).await;

    for result in results {
        let entries = result.unwrap();
        assert_eq!(entries.len(), 2);
    }
    assert_eq!(
        store.state.read_dir_calls.load(Ordering::SeqCst),
        1,
        "followers must be served from the winner's cached listing"
    );
}

/// A follower abandons the wait after the bound and reads on its own; the
/// hung original read is never cancelled.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn wait_bound_elapses_into_own_read() {
    let store = MockStore::with_root();
    store.add_dir("/slow");
    store.add_file("/slow/a.txt", b"1");
    store.state.hang_first_read_dir.store(true, Ordering::SeqCst);

    let mut config = test_config();
    config.enumeration.wait_bound_ms = 100;
    let bridge = Arc::new(BridgeAdapter::new(Arc::new(store.clone()), &config));

    let hung = {
        let bridge = Arc::clone(&bridge);
        tokio::spawn(async move { bridge.get_directory_enumeration("slow", None).await })
    };
    // Let the hung winner claim the in-flight marker first.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let entries = bridge
        .get_directory_enumeration("slow", None)
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(
        store.state.read_dir_calls.load(Ordering::SeqCst),
        2,
        "the follower performs its own read after the bound"
    );

    hung.abort();
}

/// A failed winner releases the in-flight marker immediately, so the next
/// caller neither waits out the bound nor inherits the failure.
#[tokio::test]
async fn failed_read_releases_the_claim() {
    let store = MockStore::with_root();
    let mut config = test_config();
    config.enumeration.wait_bound_ms = 2_000;
    let bridge = BridgeAdapter::new(Arc::new(store.clone()), &config);

    assert!(bridge.get_directory_enumeration("missing", None).await.is_err());

    store.add_dir("/missing");
    let started = Instant::now();
    let entries = bridge
        .get_directory_enumeration("missing", None)
        .await
        .unwrap();
    assert!(entries.is_empty());
    assert!(
        started.elapsed() < Duration::from_millis(1_000),
        "second caller must not wait out the bound behind a dead claim"
    );
    assert_eq!(store.state.read_dir_calls.load(Ordering::SeqCst), 2);
}

/// Warm start pre-populates the root and each top-level directory with
/// fresh reads; the host's first on-demand enumerations are cache hits.
#[tokio::test]
async fn warm_start_prepopulates_top_level_directories() {
    let store = MockStore::with_root();
    store.add_dir("/docs");
    store.add_dir("/objects");
    store.add_file("/notes.txt", b"x");
    store.add_file("/docs/a.txt", b"1");

    let bridge = BridgeAdapter::new(Arc::new(store.clone()), &test_config());
    bridge.warm_start().await;

    assert_eq!(
        store.state.read_dir_calls.load(Ordering::SeqCst),
        3,
        "root plus two top-level directories"
    );

    let root = bridge.get_directory_enumeration("", None).await.unwrap();
    assert_eq!(root.len(), 3);
    let docs = bridge.get_directory_enumeration("docs", None).await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(
        store.state.read_dir_calls.load(Ordering::SeqCst),
        3,
        "post-warm-start enumerations are served from cache"
    );
}
