//! Path cache: relative published path -> last-known content checksum.
//!
//! The cache belongs to one [`ObjectPublishedStorage`](crate::ObjectPublishedStorage)
//! and lives for one publish session; nothing is persisted. It starts cold
//! and is warmed one published directory at a time by listing that directory.
//! Once a directory (or one of its ancestors) has been listed, the cache is
//! authoritative for every path beneath it: an absent entry there means no
//! object exists. An entry may exist without a checksum when the listing did
//! not carry one or a copy landed from a path the cache never saw; those are
//! resolved against the store before any comparison.
//!
//! Access goes through [`PathCache::lock`], an async mutex, so a caller can
//! hold the cache across the whole lookup -> decide -> write -> update
//! sequence.

use std::collections::{BTreeSet, HashMap};

use tokio::sync::{Mutex, MutexGuard};

use crate::client::ListEntry;
use crate::path;

/// Lookup result for a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup<'a> {
    /// The path lives in a directory that has not been listed yet
    Unknown,
    /// The directory was listed and holds no object at the path
    Absent,
    /// An object exists with this checksum
    Present(&'a str),
    /// An object exists but its checksum has not been read
    Unverified,
}

#[derive(Debug, Default)]
pub struct CacheState {
    /// Directories whose full contents have been indexed
    warmed: BTreeSet<String>,
    /// `None` marks an existing object with an unread checksum
    entries: HashMap<String, Option<String>>,
}

impl CacheState {
    /// Whether `dir` or one of its ancestors has been listed.
    pub fn is_warm(&self, dir: &str) -> bool {
        self.warmed.iter().any(|warm| path::is_within(warm, dir))
    }

    /// Whether nothing was ever listed.
    pub fn is_cold(&self) -> bool {
        self.warmed.is_empty()
    }

    /// Index a listing of `dir`. Listed paths are relative to `dir`.
    pub fn warm(&mut self, dir: &str, listing: Vec<ListEntry>) {
        for entry in listing {
            self.entries
                .insert(path::join(dir, &entry.path), entry.checksum);
        }
        self.warmed.insert(dir.to_string());
    }

    pub fn lookup(&self, rel_path: &str) -> CacheLookup<'_> {
        match self.entries.get(rel_path) {
            Some(Some(checksum)) => CacheLookup::Present(checksum),
            Some(None) => CacheLookup::Unverified,
            None if self.is_warm(&path::parent(rel_path)) => CacheLookup::Absent,
            None => CacheLookup::Unknown,
        }
    }

    /// Record a confirmed write.
    pub fn record(&mut self, rel_path: &str, checksum: impl Into<String>) {
        self.entries
            .insert(rel_path.to_string(), Some(checksum.into()));
    }

    /// Forget a path after it was deleted.
    pub fn forget(&mut self, rel_path: &str) -> Option<String> {
        self.entries.remove(rel_path).flatten()
    }

    /// Move an entry after a rename. The destination exists afterwards even
    /// when the source was never seen, so it is kept as unverified.
    pub fn rename(&mut self, from: &str, to: &str) {
        let checksum = self.entries.remove(from).flatten();
        self.entries.insert(to.to_string(), checksum);
    }

    /// Copy an entry after a link was materialized.
    pub fn duplicate(&mut self, from: &str, to: &str) {
        let checksum = self.entries.get(from).cloned().flatten();
        self.entries.insert(to.to_string(), checksum);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Mutex-guarded path cache scoped to one publish session.
#[derive(Debug, Default)]
pub struct PathCache {
    state: Mutex<CacheState>,
}

impl PathCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, checksum: &str) -> ListEntry {
        ListEntry {
            path: path.to_string(),
            checksum: Some(checksum.to_string()),
        }
    }

    #[tokio::test]
    async fn test_cold_cache_knows_nothing() {
        let cache = PathCache::new();
        let state = cache.lock().await;
        assert!(state.is_cold());
        assert_eq!(state.lookup("pool/main/a.deb"), CacheLookup::Unknown);
    }

    #[tokio::test]
    async fn test_warm_indexes_relative_to_directory() {
        let cache = PathCache::new();
        let mut state = cache.lock().await;
        state.warm(
            "pool/main",
            vec![entry("a/a.deb", "aa"), entry("b/b.deb", "bb")],
        );

        assert_eq!(state.lookup("pool/main/a/a.deb"), CacheLookup::Present("aa"));
        assert_eq!(state.lookup("pool/main/a/other.deb"), CacheLookup::Absent);
        assert_eq!(state.lookup("pool/contrib/c.deb"), CacheLookup::Unknown);
        assert!(state.is_warm("pool/main/z"));
        assert!(!state.is_warm("pool/mainline"));
    }

    #[tokio::test]
    async fn test_record_forget_rename_duplicate() {
        let cache = PathCache::new();
        let mut state = cache.lock().await;
        state.warm("", Vec::new());

        state.record("a", "1");
        state.duplicate("a", "b");
        assert_eq!(state.lookup("b"), CacheLookup::Present("1"));

        state.rename("a", "c");
        assert_eq!(state.lookup("a"), CacheLookup::Absent);
        assert_eq!(state.lookup("c"), CacheLookup::Present("1"));

        assert_eq!(state.forget("c"), Some("1".to_string()));
        assert_eq!(state.len(), 1);
    }

    #[tokio::test]
    async fn test_copies_from_unseen_sources_stay_present() {
        let cache = PathCache::new();
        let mut state = cache.lock().await;
        state.warm("pool", Vec::new());

        state.rename("incoming/a.deb", "pool/a.deb");
        assert_eq!(state.lookup("pool/a.deb"), CacheLookup::Unverified);

        state.duplicate("incoming/b.deb", "pool/b.deb");
        assert_eq!(state.lookup("pool/b.deb"), CacheLookup::Unverified);

        state.record("pool/b.deb", "bb");
        assert_eq!(state.lookup("pool/b.deb"), CacheLookup::Present("bb"));
    }

    #[tokio::test]
    async fn test_listing_without_checksums_is_unverified() {
        let cache = PathCache::new();
        let mut state = cache.lock().await;
        state.warm(
            "pool",
            vec![ListEntry {
                path: "a.deb".to_string(),
                checksum: None,
            }],
        );

        assert_eq!(state.lookup("pool/a.deb"), CacheLookup::Unverified);
        assert_eq!(state.lookup("pool/b.deb"), CacheLookup::Absent);
    }
}
