//! Object store client capability.
//!
//! The published storage only needs a handful of primitives from the object
//! store: paginated listing, whole-object get/put/delete, streamed file
//! uploads, properties, leases and a server-side copy that may complete asynchronously. [`ObjectClient`]
//! captures exactly that set so different services (and the simulated store
//! in [`crate::testkit`]) can sit behind the same facade.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::ClientError;

pub mod lease;
pub mod object_store;

pub use self::lease::LeaseTable;
pub use self::object_store::ObjectStoreClient;

/// User metadata attached to an object.
pub type Metadata = BTreeMap<String, String>;

/// One object returned by a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// Full key, or a path relative to the queried prefix once enumerated
    pub path: String,
    /// Lowercase hex SHA-256, when the listing carries one
    pub checksum: Option<String>,
}

/// A single page of a listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub entries: Vec<ListEntry>,
    /// Continuation marker for the next page, `None` when exhausted
    pub next_marker: Option<String>,
}

/// Properties returned by a head-style fetch.
#[derive(Debug, Clone, Default)]
pub struct ObjectProperties {
    pub size: u64,
    /// Lowercase hex SHA-256, `None` for objects written by other tools
    pub checksum: Option<String>,
    pub metadata: Metadata,
}

impl ObjectProperties {
    /// Look up a metadata value, ignoring key case.
    ///
    /// Some services (S3) lower-case user metadata keys on the way in.
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// Status of a server-side copy into a destination key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CopyStatus {
    Pending,
    Success,
    Failed,
    Aborted,
}

impl fmt::Display for CopyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CopyStatus::Pending => "pending",
            CopyStatus::Success => "success",
            CopyStatus::Failed => "failed",
            CopyStatus::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Identifier of an exclusive write lease on one key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LeaseId(String);

impl LeaseId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh random lease id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Primitives the published storage needs from an object store.
///
/// All keys are absolute (already resolved against the publish root).
/// Implementations must be safe to share between tasks for independent keys.
#[async_trait]
pub trait ObjectClient: Send + Sync + fmt::Debug + 'static {
    /// Short human-readable backend name used in error context, e.g. `s3:bucket`.
    fn name(&self) -> String;

    /// Fetch one page of objects whose keys start with `prefix`, at all depths.
    ///
    /// `marker` is the continuation marker returned by the previous page.
    /// Entries carry a checksum only when the service reports one without an
    /// extra request per object.
    async fn list_page(&self, prefix: &str, marker: Option<&str>) -> Result<ListPage, ClientError>;

    /// Read a whole object, `None` when the key does not exist.
    async fn get_object(&self, key: &str) -> Result<Option<Bytes>, ClientError>;

    /// Replace the object at `key`. Fails when the key is leased and `lease`
    /// does not hold it.
    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        lease: Option<&LeaseId>,
    ) -> Result<(), ClientError>;

    /// Stream the local file `source` into `key`, in chunks when it is large.
    ///
    /// `checksum` is the file's SHA-256 and is stored alongside the object.
    async fn upload_file(
        &self,
        key: &str,
        source: &Path,
        checksum: &str,
        lease: Option<&LeaseId>,
    ) -> Result<(), ClientError>;

    /// Delete the object at `key`. Missing keys are not an error.
    async fn delete_object(&self, key: &str, lease: Option<&LeaseId>) -> Result<(), ClientError>;

    /// Properties of `key`, `None` when the key does not exist.
    async fn get_properties(&self, key: &str) -> Result<Option<ObjectProperties>, ClientError>;

    /// Acquire an exclusive lease on `key` for `duration`.
    async fn acquire_lease(&self, key: &str, duration: Duration) -> Result<LeaseId, ClientError>;

    /// Extend a held lease by its original duration.
    async fn renew_lease(&self, key: &str, lease: &LeaseId) -> Result<(), ClientError>;

    /// Break a held lease. Breaking a lease that is already gone is not an error.
    async fn break_lease(&self, key: &str, lease: &LeaseId) -> Result<(), ClientError>;

    /// Start a copy of `src` into `dst`, authorised by the destination lease.
    ///
    /// `metadata`, when given, is merged over the source object's metadata.
    async fn start_copy(
        &self,
        src: &str,
        dst: &str,
        metadata: Option<&Metadata>,
        dst_lease: Option<&LeaseId>,
    ) -> Result<CopyStatus, ClientError>;

    /// Current status of the copy into `dst`.
    async fn copy_status(&self, dst: &str) -> Result<CopyStatus, ClientError>;
}
