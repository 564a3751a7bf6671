//! Storage configuration, deserializable from TOML.

use std::sync::Arc;

use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::client::object_store::{ObjectStoreClient, DEFAULT_PAGE_SIZE};
use crate::client::ObjectClient;
use crate::copy::CopyPolicy;
use crate::error::{PublishError, Result};

/// Which object store to publish into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObjectStoreConfig {
    /// In-memory storage (for testing)
    #[default]
    Memory,

    /// S3-compatible storage (AWS S3, MinIO, etc.)
    S3 {
        /// Endpoint URL, e.g. "http://localhost:9000" for MinIO
        endpoint: String,
        access_key: String,
        secret_key: String,
        bucket: String,
        /// Defaults to "us-east-1"
        region: Option<String>,
    },
}

impl ObjectStoreConfig {
    /// Open a client for the configured store.
    ///
    /// S3 buckets are probed with a single listing request so that a missing
    /// bucket or bad credentials fail here rather than mid-publish.
    pub async fn connect(&self, page_size: usize) -> Result<Arc<dyn ObjectClient>> {
        let client = match self {
            ObjectStoreConfig::Memory => {
                ObjectStoreClient::new(Arc::new(InMemory::new()), "memory")
            }

            ObjectStoreConfig::S3 {
                endpoint,
                access_key,
                secret_key,
                bucket,
                region,
            } => {
                let store = AmazonS3Builder::new()
                    .with_endpoint(endpoint)
                    .with_access_key_id(access_key)
                    .with_secret_access_key(secret_key)
                    .with_bucket_name(bucket)
                    .with_region(region.as_deref().unwrap_or("us-east-1"))
                    .with_allow_http(endpoint.starts_with("http://"))
                    .build()
                    .map_err(|e| PublishError::InvalidConfig(e.to_string()))?;
                let store: Arc<dyn ObjectStore> = Arc::new(store);

                probe_bucket(store.as_ref(), bucket).await?;
                info!(endpoint = %endpoint, bucket = %bucket, "connected to bucket");
                ObjectStoreClient::new(store, format!("s3:{bucket}"))
            }
        };

        Ok(Arc::new(client.with_page_size(page_size)))
    }
}

async fn probe_bucket(store: &dyn ObjectStore, bucket: &str) -> Result<()> {
    let prefix = ObjectPath::from("");
    let mut stream = store.list(Some(&prefix));
    match stream.try_next().await {
        Ok(_) => Ok(()),
        Err(object_store::Error::NotFound { .. }) => Err(PublishError::InvalidConfig(format!(
            "bucket {bucket} not found"
        ))),
        Err(e) => {
            let msg = e.to_string();
            if msg.contains("NoSuchBucket") {
                return Err(PublishError::InvalidConfig(format!(
                    "bucket {bucket} not found"
                )));
            }
            Err(PublishError::InvalidConfig(format!(
                "cannot reach bucket {bucket}: {msg}"
            )))
        }
    }
}

/// Everything needed to build an [`ObjectPublishedStorage`](crate::ObjectPublishedStorage).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishedStorageConfig {
    /// Key prefix all published paths live under, "" for the bucket root
    pub prefix: String,
    /// Objects requested per listing page
    pub page_size: usize,
    pub backend: ObjectStoreConfig,
    pub copy: CopyPolicy,
}

impl Default for PublishedStorageConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            page_size: DEFAULT_PAGE_SIZE,
            backend: ObjectStoreConfig::default(),
            copy: CopyPolicy::default(),
        }
    }
}
