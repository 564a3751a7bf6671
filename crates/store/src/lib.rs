//! Published-artifact storage over object storage
//!
//! This crate provides a file-system-like surface (put, remove, rename, list,
//! link, symlink, exists) over an object store, for a package-repository
//! publisher that materialises pool files and index trees under a remote
//! prefix.
//!
//! # Features
//!
//! - Idempotent, conflict-aware `link_from_pool` backed by a lazily warmed
//!   path -> checksum cache
//! - Paginated, prefix-stripped listings
//! - Lease-protected copy/move with asynchronous copy polling, used to
//!   emulate rename and symbolic links
//! - Pluggable object store clients: S3/MinIO and in-memory via the
//!   `object_store` crate, plus a simulated store for tests
//!
//! # Example
//!
//! ```rust,no_run
//! use pubstore::{ObjectPublishedStorage, PublishedStorage, PublishedStorageConfig};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), pubstore::PublishError> {
//! let storage = ObjectPublishedStorage::from_config(PublishedStorageConfig::default()).await?;
//! storage
//!     .put_file("dists/stable/Release", Path::new("/tmp/Release"))
//!     .await?;
//! let files = storage.filelist("dists").await?;
//! # Ok(())
//! # }
//! ```

pub mod checksum;
pub mod client;
pub mod config;
pub mod copy;
mod error;
mod filelist;
pub mod path;
mod path_cache;
pub mod published;
mod storage;
/**
 * In-process simulated object store with
 *  asynchronous copies, fault injection and
 *  call counters. Used by the test suites.
 */
pub mod testkit;

pub use checksum::ChecksumInfo;
pub use client::{CopyStatus, LeaseId, ListEntry, ListPage, Metadata, ObjectClient, ObjectProperties};
pub use config::{ObjectStoreConfig, PublishedStorageConfig};
pub use copy::{CopyMode, CopyPolicy, LeaseRole};
pub use error::{ClientError, PublishError, Result};
pub use path_cache::{CacheLookup, CacheState, PathCache};
pub use published::{Progress, PublishedStorage};
pub use storage::ObjectPublishedStorage;

/// Metadata key carrying the link target of an emulated symbolic link.
pub const SYMLINK_METADATA_KEY: &str = "SymLink";
