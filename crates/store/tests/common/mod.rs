//! Shared setup for published storage integration tests
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use pubstore::testkit::SimulatedStore;
use pubstore::{CopyPolicy, ObjectPublishedStorage, Progress, PublishedStorage};
use tempfile::TempDir;

pub struct TestEnv {
    pub store: SimulatedStore,
    /// Storage at the bucket root
    pub storage: ObjectPublishedStorage,
    /// Storage under the `lala` prefix of the same bucket
    pub prefixed: ObjectPublishedStorage,
    /// Holds local source files
    pub dir: TempDir,
}

impl TestEnv {
    /// Write a local source file and return its path.
    pub fn source(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, contents).unwrap();
        path
    }

    /// Publish `contents` at `path` through the root storage.
    pub async fn put(&self, path: &str, contents: &[u8]) {
        let source = self.source("put-source", contents);
        self.storage.put_file(path, &source).await.unwrap();
    }

    /// A fresh storage over the same bucket, with a cold path cache.
    pub fn reopen(&self, prefix: &str) -> ObjectPublishedStorage {
        ObjectPublishedStorage::with_policy(Arc::new(self.store.clone()), prefix, fast_policy())
    }
}

/// Copy policy with a small poll bound so stuck copies fail quickly.
pub fn fast_policy() -> CopyPolicy {
    CopyPolicy {
        lease_duration_secs: 30,
        poll_interval_ms: 100,
        max_polls: Some(5),
    }
}

pub fn setup() -> TestEnv {
    setup_with_store(SimulatedStore::new())
}

pub fn setup_with_store(store: SimulatedStore) -> TestEnv {
    let client = Arc::new(store.clone());
    TestEnv {
        storage: ObjectPublishedStorage::with_policy(client.clone(), "", fast_policy()),
        prefixed: ObjectPublishedStorage::with_policy(client, "lala", fast_policy()),
        store,
        dir: TempDir::new().unwrap(),
    }
}

/// Progress sink that records every call.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    pub total: Mutex<Option<usize>>,
    pub advanced: Mutex<Vec<String>>,
    pub finished: Mutex<bool>,
}

impl Progress for RecordingProgress {
    fn start(&self, total: usize) {
        *self.total.lock() = Some(total);
    }

    fn advance(&self, path: &str) {
        self.advanced.lock().push(path.to_string());
    }

    fn finish(&self) {
        *self.finished.lock() = true;
    }
}
