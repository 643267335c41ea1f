//! Watching the current directory through a relative root.
//!
//! Changes the process working directory, so it lives in its own test binary.

#![cfg(target_os = "linux")]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rewatch_directory_watcher::{DirectoryWatcher, NotifyBackend, PathPattern, WatchConfig, WatchExit};
use tempfile::TempDir;

const SETTLE: Duration = Duration::from_millis(300);
const DEADLINE: Duration = Duration::from_secs(10);

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dot_root_matches_relative_names_and_exits_when_removed() {
    let temp = TempDir::new().unwrap();
    let tree = temp.path().join("tree");
    std::fs::create_dir_all(tree.join("src")).unwrap();
    std::env::set_current_dir(&tree).unwrap();

    let (trigger, mut trigger_rx) = rewatch_utils_trigger::channel();
    let config = WatchConfig::new(".", PathPattern::new(r"^\./src/.*\.go$").unwrap());
    let (watcher, mut done_rx) =
        DirectoryWatcher::new(config, Arc::new(NotifyBackend::new().unwrap()), trigger);
    watcher.start();
    tokio::time::sleep(SETTLE).await;

    std::fs::write(tree.join("top.go"), "package main").unwrap();
    tokio::time::sleep(SETTLE).await;
    assert!(!trigger_rx.try_recv());

    std::fs::write(tree.join("src").join("lib.go"), "package src").unwrap();
    tokio::time::timeout(DEADLINE, trigger_rx.recv())
        .await
        .expect("no trigger for ./src/lib.go")
        .expect("trigger channel closed");

    std::env::set_current_dir(temp.path()).unwrap();
    std::fs::remove_dir_all(&tree).unwrap();

    let root = tokio::time::timeout(DEADLINE, async {
        loop {
            let outcome = done_rx.recv().await.expect("completion channel closed");
            if outcome.root {
                return outcome;
            }
        }
    })
    .await
    .expect("root watcher did not finish after its directory was removed");
    assert_eq!(root.path, Path::new("."));
    assert!(matches!(root.result, Ok(WatchExit::Removed)));
}
