//! The published storage capability set.
//!
//! A publisher writes package pool files and index trees through this trait
//! without caring where they land. [`ObjectPublishedStorage`](crate::ObjectPublishedStorage)
//! is the object-store implementation; other backends (a local directory,
//! other cloud services) implement the same surface.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;

use crate::checksum::ChecksumInfo;
use crate::error::Result;

/// Progress sink for long-running removals.
pub trait Progress: Send + Sync {
    /// Work on `total` items is starting
    fn start(&self, total: usize);
    /// One item at `path` was handled
    fn advance(&self, path: &str);
    /// All items were handled
    fn finish(&self);
}

#[async_trait]
pub trait PublishedStorage: Send + Sync + fmt::Debug + fmt::Display {
    /// Create a directory. Directories may be implicit in the backend.
    async fn mkdir(&self, path: &str) -> Result<()>;

    /// Upload the local file `source` to `path`, replacing what is there.
    async fn put_file(&self, path: &str, source: &Path) -> Result<()>;

    /// Remove the file at `path`. Removing a missing file succeeds.
    async fn remove(&self, path: &str) -> Result<()>;

    /// Remove everything under `path`.
    async fn remove_dirs(&self, path: &str, progress: Option<&dyn Progress>) -> Result<()>;

    /// Rename (move) a file.
    async fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()>;

    /// Make `dst` a symbolic link to `src`.
    async fn symlink(&self, src: &str, dst: &str) -> Result<()>;

    /// Make `dst` a hard link to `src`.
    async fn hard_link(&self, src: &str, dst: &str) -> Result<()>;

    async fn file_exists(&self, path: &str) -> Result<bool>;

    /// Target of the symbolic link at `path`.
    async fn read_link(&self, path: &str) -> Result<String>;

    /// Place the package file `source_path` into `published_directory`.
    ///
    /// Skips the upload when an identical file is already there, fails with
    /// [`PublishError::Conflict`](crate::PublishError::Conflict) when a different
    /// one is, unless `force` is set.
    async fn link_from_pool(
        &self,
        published_directory: &str,
        file_name: &str,
        source_path: &Path,
        source_checksums: &ChecksumInfo,
        force: bool,
    ) -> Result<()>;

    /// Paths of all files under `prefix`, relative to it.
    async fn filelist(&self, prefix: &str) -> Result<Vec<String>>;
}
