//! Integration tests for removing published files and trees

mod common;

use common::RecordingProgress;
use pubstore::testkit::FailPoint;
use pubstore::{ChecksumInfo, PublishError, PublishedStorage};

#[tokio::test]
async fn test_remove() {
    let env = common::setup();
    env.put("a", b"a").await;
    env.put("b", b"b").await;

    env.storage.remove("a").await.unwrap();

    assert_eq!(env.storage.filelist("").await.unwrap(), vec!["b"]);
    assert!(!env.storage.file_exists("a").await.unwrap());
}

#[tokio::test]
async fn test_remove_missing_succeeds() {
    let env = common::setup();
    env.storage.remove("never/written").await.unwrap();
}

#[tokio::test]
async fn test_remove_failure_is_wrapped() {
    let env = common::setup();
    env.store.insert("lala/a", b"a".to_vec());
    env.store.fail(FailPoint::Delete("lala/a".to_string()));

    let err = env.prefixed.remove("a").await.unwrap_err();

    match &err {
        PublishError::Remove { path, storage, .. } => {
            assert_eq!(path, "lala/a");
            assert_eq!(storage, "simulated/lala");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_remove_dirs() {
    let env = common::setup();
    for path in ["dists/stable/Release", "dists/stable/main/Packages", "dists/testing/Release", "pool/a.deb"] {
        env.put(path, b"x").await;
    }
    let progress = RecordingProgress::default();

    env.storage
        .remove_dirs("dists/stable", Some(&progress))
        .await
        .unwrap();

    assert_eq!(
        env.storage.filelist("").await.unwrap(),
        vec!["dists/testing/Release", "pool/a.deb"]
    );
    assert_eq!(*progress.total.lock(), Some(2));
    assert_eq!(
        *progress.advanced.lock(),
        vec!["dists/stable/Release", "dists/stable/main/Packages"]
    );
    assert!(*progress.finished.lock());
}

#[tokio::test]
async fn test_remove_dirs_without_progress() {
    let env = common::setup();
    let source = env.source("a", b"a");
    env.prefixed.put_file("dists/a", &source).await.unwrap();
    env.put("dists/b", b"b").await;

    env.prefixed.remove_dirs("dists", None).await.unwrap();

    assert_eq!(env.store.keys(), vec!["dists/b"]);
}

#[tokio::test]
async fn test_remove_dirs_listing_failure_removes_nothing() {
    let env = common::setup();
    env.put("dists/a", b"a").await;
    env.store.fail(FailPoint::List);

    env.storage.remove_dirs("dists", None).await.unwrap();

    assert_eq!(env.store.counts().deletes, 0);
    assert!(env.store.object("dists/a").is_some());
}

#[tokio::test]
async fn test_remove_dirs_collects_every_failure() {
    let env = common::setup();
    for path in ["d/a", "d/b", "d/c"] {
        env.put(path, b"x").await;
    }
    env.store.fail(FailPoint::Delete("d/a".to_string()));
    env.store.fail(FailPoint::Delete("d/c".to_string()));

    let err = env.storage.remove_dirs("d", None).await.unwrap_err();

    match &err {
        PublishError::RemoveDirs { path, failures, .. } => {
            assert_eq!(path, "d");
            let failed: Vec<_> = failures.iter().map(|(p, _)| p.as_str()).collect();
            assert_eq!(failed, vec!["d/a", "d/c"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("2 path(s)"));
    // the loop kept going past the first failure
    assert_eq!(env.store.keys(), vec!["d/a", "d/c"]);
}

#[tokio::test]
async fn test_removed_files_leave_the_cache() {
    let env = common::setup();
    let source = env.source("a.deb", b"a");
    let sum = ChecksumInfo::of_bytes(b"a");
    env.storage
        .link_from_pool("pool/main/a", "a.deb", &source, &sum, false)
        .await
        .unwrap();

    env.storage.remove_dirs("pool", None).await.unwrap();
    env.storage
        .link_from_pool("pool/main/a", "a.deb", &source, &sum, false)
        .await
        .unwrap();

    assert_eq!(env.store.counts().puts, 2);
    assert!(env.store.object("pool/main/a/a.deb").is_some());
}

#[tokio::test]
async fn test_remove_dirs_reads_no_properties() {
    let env = common::setup();
    for key in ["pool/main/a/a.deb", "pool/main/b/b.deb", "pool/main/c/c.deb"] {
        env.store.insert_foreign(key, b"x".to_vec());
    }

    env.storage.remove_dirs("pool", None).await.unwrap();

    let counts = env.store.counts();
    assert!(env.store.keys().is_empty());
    assert_eq!(counts.deletes, 3);
    assert_eq!(counts.properties, 0);
    assert_eq!(counts.gets, 0);
}
