//! [`ObjectClient`] over the `object_store` crate (S3/MinIO/in-memory).
//!
//! The `object_store` API has no leases and no asynchronous copy, so:
//! - leases come from an in-process [`LeaseTable`]
//! - copies are a get + put that carries the merged metadata, and report
//!   [`CopyStatus::Success`] straight away
//! - content checksums are stored as a user metadata attribute on every
//!   write; listings leave them unresolved and a head request reads them
//!   back for the one key that needs it
//! - large files are uploaded in parts with bounded concurrency

use std::borrow::Cow;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{
    Attribute, AttributeValue, Attributes, GetOptions, ObjectMeta, ObjectStore,
    PutMultipartOpts, PutOptions, PutPayload, WriteMultipart,
};
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use super::{
    CopyStatus, LeaseId, LeaseTable, ListEntry, ListPage, Metadata, ObjectClient,
    ObjectProperties,
};
use crate::checksum;
use crate::error::ClientError;

/// Metadata attribute holding the lowercase hex SHA-256 of the object body.
const CHECKSUM_ATTRIBUTE: &str = "content-sha256";

/// Default number of objects per listing page (the S3 maximum).
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Part size for multipart uploads; smaller files go up in one request.
pub const DEFAULT_PART_SIZE: usize = 4 * 1024 * 1024;

/// Parts in flight at once during a multipart upload.
const UPLOAD_CONCURRENCY: usize = 16;

/// Local read buffer while streaming a file into an upload.
const READ_BUFFER: usize = 256 * 1024;

/// Object store client backed by any `object_store::ObjectStore`.
#[derive(Clone)]
pub struct ObjectStoreClient {
    inner: Arc<dyn ObjectStore>,
    name: String,
    page_size: usize,
    part_size: usize,
    leases: Arc<LeaseTable>,
}

impl fmt::Debug for ObjectStoreClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreClient")
            .field("name", &self.name)
            .field("page_size", &self.page_size)
            .field("part_size", &self.part_size)
            .finish()
    }
}

impl ObjectStoreClient {
    pub fn new(inner: Arc<dyn ObjectStore>, name: impl Into<String>) -> Self {
        Self {
            inner,
            name: name.into(),
            page_size: DEFAULT_PAGE_SIZE,
            part_size: DEFAULT_PART_SIZE,
            leases: Arc::new(LeaseTable::new()),
        }
    }

    /// Ephemeral in-memory store.
    pub fn memory() -> Self {
        Self::new(Arc::new(InMemory::new()), "memory")
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_part_size(mut self, part_size: usize) -> Self {
        self.part_size = part_size.max(1);
        self
    }

    /// Number of live leases held through this client.
    pub fn active_leases(&self) -> usize {
        self.leases.active()
    }

    async fn head(
        &self,
        location: &ObjectPath,
    ) -> Result<Option<(ObjectMeta, Attributes)>, ClientError> {
        let options = GetOptions {
            head: true,
            ..Default::default()
        };
        match self.inner.get_opts(location, options).await {
            Ok(result) => Ok(Some((result.meta, result.attributes))),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ObjectClient for ObjectStoreClient {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn list_page(&self, prefix: &str, marker: Option<&str>) -> Result<ListPage, ClientError> {
        let prefix_path = if prefix.is_empty() {
            None
        } else {
            Some(to_location(prefix))
        };

        let stream = match marker {
            Some(marker) => self
                .inner
                .list_with_offset(prefix_path.as_ref(), &to_location(marker)),
            None => self.inner.list(prefix_path.as_ref()),
        };

        // one extra to learn whether another page follows
        let mut metas: Vec<ObjectMeta> = stream.take(self.page_size + 1).try_collect().await?;
        metas.sort_by(|a, b| a.location.cmp(&b.location));

        let next_marker = if metas.len() > self.page_size {
            metas.truncate(self.page_size);
            metas.last().map(|meta| from_location(&meta.location))
        } else {
            None
        };

        // listings carry no user metadata, checksums stay unresolved
        let entries: Vec<ListEntry> = metas
            .iter()
            .map(|meta| ListEntry {
                path: from_location(&meta.location),
                checksum: None,
            })
            .collect();

        debug!(prefix = %prefix, count = entries.len(), more = next_marker.is_some(), "listed page");
        Ok(ListPage {
            entries,
            next_marker,
        })
    }

    async fn get_object(&self, key: &str) -> Result<Option<Bytes>, ClientError> {
        match self.inner.get(&to_location(key)).await {
            Ok(result) => Ok(Some(result.bytes().await?)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        lease: Option<&LeaseId>,
    ) -> Result<(), ClientError> {
        self.leases.authorize(key, lease)?;

        let options = PutOptions {
            attributes: checksum_attributes(&checksum::digest(&data)),
            ..Default::default()
        };
        self.inner
            .put_opts(&to_location(key), PutPayload::from(data), options)
            .await?;
        Ok(())
    }

    async fn upload_file(
        &self,
        key: &str,
        source: &Path,
        checksum: &str,
        lease: Option<&LeaseId>,
    ) -> Result<(), ClientError> {
        self.leases.authorize(key, lease)?;

        let location = to_location(key);
        let size = tokio::fs::metadata(source).await?.len();
        if size <= self.part_size as u64 {
            let data = tokio::fs::read(source).await?;
            let options = PutOptions {
                attributes: checksum_attributes(checksum),
                ..Default::default()
            };
            self.inner
                .put_opts(&location, PutPayload::from(data), options)
                .await?;
            return Ok(());
        }

        let options = PutMultipartOpts {
            attributes: checksum_attributes(checksum),
            ..Default::default()
        };
        let upload = self.inner.put_multipart_opts(&location, options).await?;
        let mut writer = WriteMultipart::new_with_chunk_size(upload, self.part_size);

        if let Err(e) = stream_file(&mut writer, source).await {
            if let Err(abort) = writer.abort().await {
                warn!(key = %key, error = %abort, "failed to abort multipart upload");
            }
            return Err(e);
        }
        writer.finish().await?;

        debug!(key = %key, size, part_size = self.part_size, "uploaded in parts");
        Ok(())
    }

    async fn delete_object(&self, key: &str, lease: Option<&LeaseId>) -> Result<(), ClientError> {
        self.leases.authorize(key, lease)?;

        match self.inner.delete(&to_location(key)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }
        self.leases.forget(key);
        Ok(())
    }

    async fn get_properties(&self, key: &str) -> Result<Option<ObjectProperties>, ClientError> {
        let Some((meta, attributes)) = self.head(&to_location(key)).await? else {
            return Ok(None);
        };

        Ok(Some(ObjectProperties {
            size: meta.size as u64,
            checksum: stored_checksum(&attributes),
            metadata: user_metadata(&attributes),
        }))
    }

    async fn acquire_lease(&self, key: &str, duration: Duration) -> Result<LeaseId, ClientError> {
        self.leases.acquire(key, duration)
    }

    async fn renew_lease(&self, key: &str, lease: &LeaseId) -> Result<(), ClientError> {
        self.leases.renew(key, lease)
    }

    async fn break_lease(&self, key: &str, lease: &LeaseId) -> Result<(), ClientError> {
        self.leases.release(key, lease)
    }

    async fn start_copy(
        &self,
        src: &str,
        dst: &str,
        metadata: Option<&Metadata>,
        dst_lease: Option<&LeaseId>,
    ) -> Result<CopyStatus, ClientError> {
        self.leases.authorize(dst, dst_lease)?;

        let source = match self.inner.get(&to_location(src)).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(ClientError::NotFound(src.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let mut attributes = source.attributes.clone();
        for (key, value) in metadata.into_iter().flatten() {
            attributes.insert(
                Attribute::Metadata(Cow::Owned(key.clone())),
                AttributeValue::from(value.clone()),
            );
        }
        let data = source.bytes().await?;
        let options = PutOptions {
            attributes,
            ..Default::default()
        };

        self.inner
            .put_opts(&to_location(dst), PutPayload::from(data), options)
            .await?;
        Ok(CopyStatus::Success)
    }

    async fn copy_status(&self, dst: &str) -> Result<CopyStatus, ClientError> {
        match self.head(&to_location(dst)).await? {
            Some(_) => Ok(CopyStatus::Success),
            None => Ok(CopyStatus::Failed),
        }
    }
}

fn to_location(key: &str) -> ObjectPath {
    ObjectPath::from(key)
}

/// Undo the percent-encoding `object_store` applies to reserved characters
/// (e.g. `~` in Debian version strings) so listed keys match what was written.
fn from_location(location: &ObjectPath) -> String {
    let decoded = urlencoding::decode_binary(location.as_ref().as_bytes());
    String::from_utf8_lossy(&decoded).into_owned()
}

async fn stream_file(writer: &mut WriteMultipart, source: &Path) -> Result<(), ClientError> {
    let mut file = tokio::fs::File::open(source).await?;
    let mut buf = vec![0u8; READ_BUFFER];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        writer.wait_for_capacity(UPLOAD_CONCURRENCY).await?;
        writer.write(&buf[..n]);
    }
}

fn checksum_attributes(checksum: &str) -> Attributes {
    let mut attributes = Attributes::new();
    attributes.insert(
        Attribute::Metadata(Cow::Borrowed(CHECKSUM_ATTRIBUTE)),
        AttributeValue::from(checksum.to_string()),
    );
    attributes
}

fn user_metadata(attributes: &Attributes) -> Metadata {
    attributes
        .iter()
        .filter_map(|(attribute, value)| match attribute {
            Attribute::Metadata(key) if key.as_ref() != CHECKSUM_ATTRIBUTE => {
                Some((key.to_string(), value.as_ref().to_string()))
            }
            _ => None,
        })
        .collect()
}

/// The SHA-256 written with the object. ETags are never used: they are MD5
/// or service-specific and cannot be compared with a SHA-256.
fn stored_checksum(attributes: &Attributes) -> Option<String> {
    attributes
        .get(&Attribute::Metadata(Cow::Borrowed(CHECKSUM_ATTRIBUTE)))
        .map(|value| value.as_ref().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEASE: Duration = Duration::from_secs(30);

    async fn put(client: &ObjectStoreClient, key: &str, data: &'static [u8]) {
        client
            .put_object(key, Bytes::from_static(data), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_put_get_and_checksum() {
        let client = ObjectStoreClient::memory();
        put(&client, "pool/a.deb", b"hello").await;

        let data = client.get_object("pool/a.deb").await.unwrap().unwrap();
        assert_eq!(data, Bytes::from_static(b"hello"));

        let props = client.get_properties("pool/a.deb").await.unwrap().unwrap();
        assert_eq!(props.size, 5);
        assert_eq!(props.checksum, Some(checksum::digest(b"hello")));
        assert!(props.metadata.is_empty());

        assert!(client.get_properties("pool/b.deb").await.unwrap().is_none());
        assert!(client.get_object("pool/b.deb").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_pages_follow_marker() {
        let client = ObjectStoreClient::memory().with_page_size(2);
        for key in ["d/a", "d/b", "d/c", "d/e/f", "other"] {
            put(&client, key, b"x").await;
        }

        let first = client.list_page("d/", None).await.unwrap();
        let keys: Vec<_> = first.entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(keys, vec!["d/a", "d/b"]);
        assert_eq!(first.next_marker.as_deref(), Some("d/b"));

        let second = client.list_page("d/", first.next_marker.as_deref()).await.unwrap();
        let keys: Vec<_> = second.entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(keys, vec!["d/c", "d/e/f"]);
        assert!(second.next_marker.is_none());
        assert!(second.entries.iter().all(|e| e.checksum.is_none()));
    }

    #[tokio::test]
    async fn test_foreign_object_has_no_checksum() {
        let inner = Arc::new(InMemory::new());
        let client = ObjectStoreClient::new(inner.clone(), "memory");
        inner
            .put(&ObjectPath::from("pool/a.deb"), PutPayload::from_static(b"hello"))
            .await
            .unwrap();

        // the backend has an etag, which must not stand in for a SHA-256
        let props = client.get_properties("pool/a.deb").await.unwrap().unwrap();
        assert_eq!(props.size, 5);
        assert!(props.checksum.is_none());
    }

    #[tokio::test]
    async fn test_upload_file_small_and_in_parts() {
        let dir = tempfile::tempdir().unwrap();
        let small = dir.path().join("small.deb");
        let large = dir.path().join("large.deb");
        std::fs::write(&small, b"tiny").unwrap();
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&large, &data).unwrap();

        let client = ObjectStoreClient::memory().with_part_size(1024);
        let small_sum = checksum::digest(b"tiny");
        let large_sum = checksum::digest(&data);
        client
            .upload_file("pool/small.deb", &small, &small_sum, None)
            .await
            .unwrap();
        client
            .upload_file("pool/large.deb", &large, &large_sum, None)
            .await
            .unwrap();

        assert_eq!(
            client.get_object("pool/small.deb").await.unwrap().unwrap(),
            Bytes::from_static(b"tiny")
        );
        assert_eq!(
            client.get_object("pool/large.deb").await.unwrap().unwrap(),
            Bytes::from(data)
        );
        let props = client.get_properties("pool/large.deb").await.unwrap().unwrap();
        assert_eq!(props.size, 5000);
        assert_eq!(props.checksum, Some(large_sum));
    }

    #[tokio::test]
    async fn test_upload_file_respects_leases() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.deb");
        std::fs::write(&source, b"a").unwrap();
        let client = ObjectStoreClient::memory();

        let _id = client.acquire_lease("a", LEASE).await.unwrap();
        assert!(matches!(
            client.upload_file("a", &source, &checksum::digest(b"a"), None).await,
            Err(ClientError::LeaseHeld(_))
        ));
    }

    #[tokio::test]
    async fn test_upload_missing_file_is_io_error() {
        let client = ObjectStoreClient::memory();
        let err = client
            .upload_file("a", Path::new("/nonexistent/a.deb"), "00", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Io(_)));
        assert!(client.get_object("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_listing_round_trips_reserved_characters() {
        let client = ObjectStoreClient::memory();
        put(&client, "pool/f/foo_1.0~rc1.deb", b"x").await;
        // a literal escape sequence must survive a single decode
        put(&client, "pool/g/gcc_1.0%2Bb1.deb", b"x").await;

        let page = client.list_page("pool/", None).await.unwrap();
        assert_eq!(page.entries[0].path, "pool/f/foo_1.0~rc1.deb");
        assert_eq!(page.entries[1].path, "pool/g/gcc_1.0%2Bb1.deb");
        assert!(client
            .get_object("pool/f/foo_1.0~rc1.deb")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_leased_key_rejects_unleased_writes() {
        let client = ObjectStoreClient::memory();
        put(&client, "a", b"one").await;

        let id = client.acquire_lease("a", LEASE).await.unwrap();
        assert!(matches!(
            client.put_object("a", Bytes::from_static(b"two"), None).await,
            Err(ClientError::LeaseHeld(_))
        ));
        client
            .put_object("a", Bytes::from_static(b"two"), Some(&id))
            .await
            .unwrap();

        client.break_lease("a", &id).await.unwrap();
        assert_eq!(client.active_leases(), 0);
        put(&client, "a", b"three").await;
    }

    #[tokio::test]
    async fn test_copy_merges_metadata() {
        let client = ObjectStoreClient::memory();
        put(&client, "src", b"payload").await;

        let mut metadata = Metadata::new();
        metadata.insert("SymLink".to_string(), "src".to_string());
        let status = client
            .start_copy("src", "dst", Some(&metadata), None)
            .await
            .unwrap();
        assert_eq!(status, CopyStatus::Success);
        assert_eq!(client.copy_status("dst").await.unwrap(), CopyStatus::Success);

        let props = client.get_properties("dst").await.unwrap().unwrap();
        assert_eq!(props.metadata_value("SymLink"), Some("src"));
        assert_eq!(props.checksum, Some(checksum::digest(b"payload")));
    }

    #[tokio::test]
    async fn test_copy_of_missing_source_is_not_found() {
        let client = ObjectStoreClient::memory();
        let err = client.start_copy("missing", "dst", None, None).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let client = ObjectStoreClient::memory();
        client.delete_object("never-written", None).await.unwrap();
        put(&client, "a", b"x").await;
        client.delete_object("a", None).await.unwrap();
        assert!(client.get_object("a").await.unwrap().is_none());
    }
}
