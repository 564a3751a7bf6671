//! Integration tests for placing pool files into published directories

mod common;

use std::sync::Arc;

use bytes::Bytes;
use pubstore::testkit::FailPoint;
use pubstore::{ChecksumInfo, PublishError, PublishedStorage};

#[tokio::test]
async fn test_link_from_pool_names_object_after_pool_file() {
    let env = common::setup();
    let source = env.source("pool/a/ab/ab_1.0_amd64.deb", b"package");
    let sum = ChecksumInfo::of_bytes(b"package");

    env.prefixed
        .link_from_pool("pool/main/a/ab", "ab_1.0_amd64.deb", &source, &sum, false)
        .await
        .unwrap();

    assert_eq!(
        env.store.object("lala/pool/main/a/ab/ab_1.0_amd64.deb").unwrap(),
        Bytes::from_static(b"package")
    );
}

#[tokio::test]
async fn test_link_from_pool_is_idempotent() {
    let env = common::setup();
    let source = env.source("mars-invaders_1.03.deb", b"Contents");
    let sum = ChecksumInfo::of_bytes(b"Contents");

    for _ in 0..3 {
        env.storage
            .link_from_pool("pool/main/m/mars-invaders", "mars-invaders_1.03.deb", &source, &sum, false)
            .await
            .unwrap();
    }

    assert_eq!(env.store.counts().puts, 1);
    // the directory is listed once, later calls hit the cache
    assert_eq!(env.store.counts().list_pages, 1);
}

#[tokio::test]
async fn test_link_from_pool_skips_identical_file_from_earlier_run() {
    let env = common::setup();
    env.store.insert("pool/main/m/mars-invaders/mars-invaders_1.03.deb", b"Contents".to_vec());
    let source = env.source("mars-invaders_1.03.deb", b"Contents");

    env.storage
        .link_from_pool(
            "pool/main/m/mars-invaders",
            "mars-invaders_1.03.deb",
            &source,
            &ChecksumInfo::of_bytes(b"Contents"),
            false,
        )
        .await
        .unwrap();

    assert_eq!(env.store.counts().puts, 0);
}

#[tokio::test]
async fn test_link_from_pool_conflict_leaves_destination() {
    let env = common::setup();
    let key = "pool/main/m/mars-invaders/mars-invaders_1.03.deb";
    env.store.insert(key, b"Old contents".to_vec());
    let source = env.source("mars-invaders_1.03.deb", b"New contents");

    let err = env
        .storage
        .link_from_pool(
            "pool/main/m/mars-invaders",
            "mars-invaders_1.03.deb",
            &source,
            &ChecksumInfo::of_bytes(b"New contents"),
            false,
        )
        .await
        .unwrap_err();

    match &err {
        PublishError::Conflict { path, .. } => assert_eq!(path, key),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("file already exists and is different"));
    assert_eq!(env.store.object(key).unwrap(), Bytes::from_static(b"Old contents"));
    assert_eq!(env.store.counts().puts, 0);
}

#[tokio::test]
async fn test_link_from_pool_force_overwrites() {
    let env = common::setup();
    let key = "pool/main/m/mars-invaders/mars-invaders_1.03.deb";
    env.store.insert(key, b"Old contents".to_vec());
    let source = env.source("mars-invaders_1.03.deb", b"New contents");
    let sum = ChecksumInfo::of_bytes(b"New contents");

    env.storage
        .link_from_pool("pool/main/m/mars-invaders", "mars-invaders_1.03.deb", &source, &sum, true)
        .await
        .unwrap();
    assert_eq!(
        env.storage.read_file(key).await.unwrap().unwrap(),
        Bytes::from_static(b"New contents")
    );

    // the cache now holds the new checksum
    env.storage
        .link_from_pool("pool/main/m/mars-invaders", "mars-invaders_1.03.deb", &source, &sum, false)
        .await
        .unwrap();
    assert_eq!(env.store.counts().puts, 1);
}

#[tokio::test]
async fn test_link_from_pool_lists_each_directory_once() {
    let env = common::setup();
    env.store.insert("pool/contrib/b/b.deb", b"old b".to_vec());
    let a = env.source("a.deb", b"a");
    let b = env.source("b.deb", b"new b");

    env.storage
        .link_from_pool("pool/main/a", "a.deb", &a, &ChecksumInfo::of_bytes(b"a"), false)
        .await
        .unwrap();

    // a directory outside the first listing still detects the conflict
    let err = env
        .storage
        .link_from_pool("pool/contrib/b", "b.deb", &b, &ChecksumInfo::of_bytes(b"new b"), false)
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::Conflict { .. }));
    assert_eq!(env.store.counts().list_pages, 2);

    env.storage
        .link_from_pool("pool/main/a", "a.deb", &a, &ChecksumInfo::of_bytes(b"a"), false)
        .await
        .unwrap();
    assert_eq!(env.store.counts().list_pages, 2);
}

#[tokio::test]
async fn test_link_from_pool_failed_write_keeps_cache() {
    let env = common::setup();
    let source = env.source("a.deb", b"a");
    let sum = ChecksumInfo::of_bytes(b"a");

    env.store.fail(FailPoint::Put);
    let err = env
        .storage
        .link_from_pool("pool/main/a", "a.deb", &source, &sum, false)
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::Upload { .. }));

    env.store.heal(&FailPoint::Put);
    env.storage
        .link_from_pool("pool/main/a", "a.deb", &source, &sum, false)
        .await
        .unwrap();
    assert!(env.store.object("pool/main/a/a.deb").is_some());
}

#[tokio::test]
async fn test_link_from_pool_sees_prior_put_file() {
    let env = common::setup();
    let source = env.source("a.deb", b"a");

    env.storage
        .link_from_pool("pool/main/a", "a.deb", &source, &ChecksumInfo::of_bytes(b"a"), false)
        .await
        .unwrap();

    let replacement = env.source("other", b"replaced");
    env.storage.put_file("pool/main/a/a.deb", &replacement).await.unwrap();

    let err = env
        .storage
        .link_from_pool("pool/main/a", "a.deb", &source, &ChecksumInfo::of_bytes(b"a"), false)
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::Conflict { .. }));
}

#[tokio::test]
async fn test_concurrent_links_write_once() {
    let env = common::setup();
    let storage = Arc::new(env.reopen(""));
    let source = env.source("a.deb", b"a");
    let sum = ChecksumInfo::of_bytes(b"a");

    let (first, second) = tokio::join!(
        storage.link_from_pool("pool/main/a", "a.deb", &source, &sum, false),
        storage.link_from_pool("pool/main/a", "a.deb", &source, &sum, false),
    );

    first.unwrap();
    second.unwrap();
    assert_eq!(env.store.counts().puts, 1);
    assert_eq!(env.store.counts().list_pages, 1);
}

#[tokio::test]
async fn test_concurrent_different_links_conflict_once() {
    let env = common::setup();
    let storage = Arc::new(env.reopen(""));
    let one = env.source("one/a.deb", b"one");
    let two = env.source("two/a.deb", b"two");
    let one_sum = ChecksumInfo::of_bytes(b"one");
    let two_sum = ChecksumInfo::of_bytes(b"two");

    let (first, second) = tokio::join!(
        storage.link_from_pool("pool/main/a", "a.deb", &one, &one_sum, false),
        storage.link_from_pool("pool/main/a", "a.deb", &two, &two_sum, false),
    );

    let results = [&first, &second];
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(PublishError::Conflict { .. })))
        .count();
    assert_eq!(conflicts, 1);
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(env.store.counts().puts, 1);
}

#[tokio::test]
async fn test_link_from_pool_verifies_foreign_files() {
    let env = common::setup();
    env.store.insert_foreign("pool/main/a/a.deb", b"a".to_vec());
    env.store.insert_foreign("pool/main/a/b.deb", b"other".to_vec());
    let a = env.source("a.deb", b"a");
    let b = env.source("b.deb", b"b");

    env.storage
        .link_from_pool("pool/main/a", "a.deb", &a, &ChecksumInfo::of_bytes(b"a"), false)
        .await
        .unwrap();
    let err = env
        .storage
        .link_from_pool("pool/main/a", "b.deb", &b, &ChecksumInfo::of_bytes(b"b"), false)
        .await
        .unwrap_err();

    assert!(matches!(err, PublishError::Conflict { .. }));
    assert_eq!(
        env.store.object("pool/main/a/b.deb").unwrap(),
        Bytes::from_static(b"other")
    );
    let counts = env.store.counts();
    assert_eq!(counts.puts, 0);
    // bodies are digested only for the two keys that were linked
    assert_eq!(counts.properties, 2);
    assert_eq!(counts.gets, 2);
}
