//! Error types for the published storage.

use std::path::PathBuf;

use crate::client::CopyStatus;
use crate::copy::LeaseRole;

/// Errors returned by an [`ObjectClient`](crate::ObjectClient).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The key does not exist
    #[error("object not found: {0}")]
    NotFound(String),

    /// The key is leased by someone else
    #[error("object {0} is leased by another holder")]
    LeaseHeld(String),

    /// A lease operation used an id that does not hold the key
    #[error("lease id does not match the active lease on {0}")]
    LeaseMismatch(String),

    /// Object storage error
    #[error("object storage error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Fault injected by the simulated store
    #[error("injected failure in {op} for {key}")]
    Injected { op: &'static str, key: String },

    #[error("internal client error: {0}")]
    Internal(String),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        match self {
            ClientError::NotFound(_) => true,
            ClientError::ObjectStore(object_store::Error::NotFound { .. }) => true,
            _ => false,
        }
    }
}

/// Errors surfaced by [`PublishedStorage`](crate::PublishedStorage) operations.
///
/// Every variant names the storage instance (`<backend>/<prefix>`) and the
/// path(s) involved so the publisher can report it as-is.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("error uploading {} to {destination} in {storage}: {source}", .source_path.display())]
    Upload {
        source_path: PathBuf,
        destination: String,
        storage: String,
        #[source]
        source: ClientError,
    },

    #[error("error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error deleting {path} from {storage}: {source}")]
    Remove {
        path: String,
        storage: String,
        #[source]
        source: ClientError,
    },

    /// One or more entries under a directory could not be deleted
    #[error("error deleting {} path(s) under {path} from {storage}: {}", .failures.len(), summarize(.failures))]
    RemoveDirs {
        path: String,
        storage: String,
        failures: Vec<(String, ClientError)>,
    },

    #[error("error listing under prefix {prefix} in {storage}: {source}")]
    Listing {
        prefix: String,
        storage: String,
        #[source]
        source: ClientError,
    },

    #[error("error caching paths under prefix {prefix} in {storage}: {source}")]
    CacheWarm {
        prefix: String,
        storage: String,
        #[source]
        source: Box<PublishError>,
    },

    /// Destination exists with a different checksum and overwrite was not forced
    #[error("error putting file to {path}: file already exists and is different: {storage}")]
    Conflict { path: String, storage: String },

    #[error("error acquiring lease on {role} object {key} in {storage}: {source}")]
    LeaseAcquire {
        role: LeaseRole,
        key: String,
        storage: String,
        #[source]
        source: ClientError,
    },

    #[error("error renewing {role} object lease {key} in {storage}: {source}")]
    LeaseRenew {
        role: LeaseRole,
        key: String,
        storage: String,
        #[source]
        source: ClientError,
    },

    #[error("error copying {src} -> {dst} in {storage}: {source}")]
    CopyStart {
        src: String,
        dst: String,
        storage: String,
        #[source]
        source: ClientError,
    },

    #[error("error copying {src} -> {dst} in {storage}: {status}")]
    CopyFailed {
        src: String,
        dst: String,
        storage: String,
        status: CopyStatus,
    },

    #[error("error copying {src} -> {dst} in {storage}: still pending after {polls} polls")]
    CopyTimeout {
        src: String,
        dst: String,
        storage: String,
        polls: u32,
    },

    #[error("copy {src} -> {dst} in {storage} cancelled")]
    CopyCancelled {
        src: String,
        dst: String,
        storage: String,
    },

    #[error("error deleting source {src} after copy in {storage}: {source}")]
    MoveCleanup {
        src: String,
        storage: String,
        #[source]
        source: ClientError,
    },

    #[error("error getting properties of {path} in {storage}: {source}")]
    Properties {
        path: String,
        storage: String,
        #[source]
        source: ClientError,
    },

    #[error("{path} not found in {storage}")]
    NotFound { path: String, storage: String },

    #[error("{path} in {storage} is not a link")]
    NotALink { path: String, storage: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

fn summarize(failures: &[(String, ClientError)]) -> String {
    failures
        .iter()
        .map(|(path, err)| format!("{}: {}", path, err))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias for published storage operations.
pub type Result<T> = std::result::Result<T, PublishError>;
