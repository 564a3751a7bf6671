//! Content checksums used to compare published files.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

const READ_CHUNK: usize = 64 * 1024;

/// Checksums of a package file, as supplied by the package pool.
///
/// Only `sha256` takes part in published-file comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumInfo {
    /// Size in bytes
    pub size: u64,
    /// Lowercase hex SHA-256 digest
    pub sha256: String,
}

impl ChecksumInfo {
    pub fn new(size: u64, sha256: impl Into<String>) -> Self {
        Self {
            size,
            sha256: sha256.into().to_ascii_lowercase(),
        }
    }

    /// Checksum an in-memory buffer.
    pub fn of_bytes(data: &[u8]) -> Self {
        Self {
            size: data.len() as u64,
            sha256: digest(data),
        }
    }

    /// Checksum a local file, reading it in chunks.
    pub async fn compute(path: &Path) -> std::io::Result<Self> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; READ_CHUNK];
        let mut size = 0u64;

        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            size += n as u64;
        }

        Ok(Self {
            size,
            sha256: hex::encode(hasher.finalize()),
        })
    }
}

/// Lowercase hex SHA-256 of `data`.
pub fn digest(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
