//! Lightweight simulated object store for tests
//!
//! [`SimulatedStore`] keeps objects in memory and models the parts of a real
//! object service that the in-memory `object_store` backend cannot: copies
//! that stay pending for a while (or forever), failing copies, small listing
//! pages, injected faults and call counters. Listings report checksums the
//! way services with a content digest in their listing do, except for
//! objects seeded with [`SimulatedStore::insert_foreign`].
//!
//! # Example
//!
//! ```rust,ignore
//! use pubstore::testkit::{CopyBehavior, SimulatedStore};
//!
//! let store = SimulatedStore::new().with_page_size(2);
//! store.insert("pool/a.deb", b"data".to_vec());
//! store.set_copy_behavior(CopyBehavior::CompleteAfter(3));
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::checksum;
use crate::client::{
    CopyStatus, LeaseId, LeaseTable, ListEntry, ListPage, Metadata, ObjectClient,
    ObjectProperties,
};
use crate::error::ClientError;

/// How the next copies started on the store behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CopyBehavior {
    /// Copy completes synchronously
    #[default]
    Immediate,
    /// Copy reports pending for this many status polls, then succeeds
    CompleteAfter(u32),
    /// Copy reports pending for this many status polls, then fails
    FailAfter(u32),
    /// Copy stays pending forever
    NeverComplete,
}

/// Operations that can be made to fail.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FailPoint {
    /// Every listing page request
    List,
    /// Every put
    Put,
    /// Deleting this key
    Delete(String),
    /// Acquiring a lease on this key
    AcquireLease(String),
    /// Every lease renewal
    RenewLease,
    /// Fetching properties of this key
    Properties(String),
    /// Starting any copy
    StartCopy,
}

/// Number of calls made against the store, per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub list_pages: usize,
    pub puts: usize,
    pub gets: usize,
    pub properties: usize,
    pub deletes: usize,
    pub copies: usize,
    pub copy_polls: usize,
    pub lease_acquires: usize,
    pub lease_renewals: usize,
    pub lease_breaks: usize,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    /// `None` for objects written without a checksum
    checksum: Option<String>,
    metadata: Metadata,
}

#[derive(Debug)]
struct PendingCopy {
    object: StoredObject,
    /// Polls left before the outcome is reported, `None` for never
    remaining: Option<u32>,
    outcome: CopyStatus,
}

#[derive(Debug, Default)]
struct Inner {
    objects: BTreeMap<String, StoredObject>,
    copies: HashMap<String, PendingCopy>,
    copy_behavior: CopyBehavior,
    faults: HashSet<FailPoint>,
    counts: CallCounts,
}

impl Inner {
    fn check(&self, point: FailPoint, op: &'static str, key: &str) -> Result<(), ClientError> {
        if self.faults.contains(&point) {
            return Err(ClientError::Injected {
                op,
                key: key.to_string(),
            });
        }
        Ok(())
    }
}

/// In-memory [`ObjectClient`] with controllable copy and failure behavior.
#[derive(Debug, Clone)]
pub struct SimulatedStore {
    inner: Arc<Mutex<Inner>>,
    leases: Arc<LeaseTable>,
    page_size: usize,
}

impl Default for SimulatedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            leases: Arc::new(LeaseTable::new()),
            page_size: 1000,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /* Setup */

    /// Seed an object directly, bypassing leases, faults and counters.
    pub fn insert(&self, key: &str, data: impl Into<Bytes>) {
        let data = data.into();
        let object = StoredObject {
            checksum: Some(checksum::digest(&data)),
            data,
            metadata: Metadata::new(),
        };
        self.inner.lock().objects.insert(key.to_string(), object);
    }

    /// Seed an object as another tool would have written it, with no
    /// checksum in its listing or properties.
    pub fn insert_foreign(&self, key: &str, data: impl Into<Bytes>) {
        let object = StoredObject {
            checksum: None,
            data: data.into(),
            metadata: Metadata::new(),
        };
        self.inner.lock().objects.insert(key.to_string(), object);
    }

    pub fn set_copy_behavior(&self, behavior: CopyBehavior) {
        self.inner.lock().copy_behavior = behavior;
    }

    pub fn fail(&self, point: FailPoint) {
        self.inner.lock().faults.insert(point);
    }

    pub fn heal(&self, point: &FailPoint) {
        self.inner.lock().faults.remove(point);
    }

    /* Inspection */

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.inner.lock().objects.get(key).map(|o| o.data.clone())
    }

    pub fn metadata(&self, key: &str) -> Option<Metadata> {
        self.inner
            .lock()
            .objects
            .get(key)
            .map(|o| o.metadata.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.lock().objects.keys().cloned().collect()
    }

    pub fn counts(&self) -> CallCounts {
        self.inner.lock().counts
    }

    pub fn active_leases(&self) -> usize {
        self.leases.active()
    }
}

#[async_trait]
impl ObjectClient for SimulatedStore {
    fn name(&self) -> String {
        "simulated".to_string()
    }

    async fn list_page(&self, prefix: &str, marker: Option<&str>) -> Result<ListPage, ClientError> {
        let mut inner = self.inner.lock();
        inner.counts.list_pages += 1;
        inner.check(FailPoint::List, "list", prefix)?;

        let mut matching = inner
            .objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .filter(|(key, _)| marker.map_or(true, |m| key.as_str() > m));

        let entries: Vec<ListEntry> = matching
            .by_ref()
            .take(self.page_size)
            .map(|(key, object)| ListEntry {
                path: key.clone(),
                checksum: object.checksum.clone(),
            })
            .collect();

        let next_marker = match matching.next() {
            Some(_) => entries.last().map(|entry| entry.path.clone()),
            None => None,
        };

        Ok(ListPage {
            entries,
            next_marker,
        })
    }

    async fn get_object(&self, key: &str) -> Result<Option<Bytes>, ClientError> {
        let mut inner = self.inner.lock();
        inner.counts.gets += 1;
        Ok(inner.objects.get(key).map(|o| o.data.clone()))
    }

    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        lease: Option<&LeaseId>,
    ) -> Result<(), ClientError> {
        let mut inner = self.inner.lock();
        inner.counts.puts += 1;
        inner.check(FailPoint::Put, "put", key)?;
        self.leases.authorize(key, lease)?;

        let object = StoredObject {
            checksum: Some(checksum::digest(&data)),
            data,
            metadata: Metadata::new(),
        };
        inner.objects.insert(key.to_string(), object);
        Ok(())
    }

    async fn upload_file(
        &self,
        key: &str,
        source: &Path,
        checksum: &str,
        lease: Option<&LeaseId>,
    ) -> Result<(), ClientError> {
        let data = tokio::fs::read(source).await?;

        let mut inner = self.inner.lock();
        inner.counts.puts += 1;
        inner.check(FailPoint::Put, "put", key)?;
        self.leases.authorize(key, lease)?;

        let object = StoredObject {
            checksum: Some(checksum.to_string()),
            data: Bytes::from(data),
            metadata: Metadata::new(),
        };
        inner.objects.insert(key.to_string(), object);
        Ok(())
    }

    async fn delete_object(&self, key: &str, lease: Option<&LeaseId>) -> Result<(), ClientError> {
        let mut inner = self.inner.lock();
        inner.counts.deletes += 1;
        inner.check(FailPoint::Delete(key.to_string()), "delete", key)?;
        self.leases.authorize(key, lease)?;

        inner.objects.remove(key);
        self.leases.forget(key);
        Ok(())
    }

    async fn get_properties(&self, key: &str) -> Result<Option<ObjectProperties>, ClientError> {
        let mut inner = self.inner.lock();
        inner.counts.properties += 1;
        inner.check(FailPoint::Properties(key.to_string()), "properties", key)?;

        Ok(inner.objects.get(key).map(|object| ObjectProperties {
            size: object.data.len() as u64,
            checksum: object.checksum.clone(),
            metadata: object.metadata.clone(),
        }))
    }

    async fn acquire_lease(&self, key: &str, duration: Duration) -> Result<LeaseId, ClientError> {
        let mut inner = self.inner.lock();
        inner.counts.lease_acquires += 1;
        inner.check(FailPoint::AcquireLease(key.to_string()), "acquire lease", key)?;
        self.leases.acquire(key, duration)
    }

    async fn renew_lease(&self, key: &str, lease: &LeaseId) -> Result<(), ClientError> {
        let mut inner = self.inner.lock();
        inner.counts.lease_renewals += 1;
        inner.check(FailPoint::RenewLease, "renew lease", key)?;
        self.leases.renew(key, lease)
    }

    async fn break_lease(&self, key: &str, lease: &LeaseId) -> Result<(), ClientError> {
        self.inner.lock().counts.lease_breaks += 1;
        self.leases.release(key, lease)
    }

    async fn start_copy(
        &self,
        src: &str,
        dst: &str,
        metadata: Option<&Metadata>,
        dst_lease: Option<&LeaseId>,
    ) -> Result<CopyStatus, ClientError> {
        let mut inner = self.inner.lock();
        inner.counts.copies += 1;
        inner.check(FailPoint::StartCopy, "copy", dst)?;
        self.leases.authorize(dst, dst_lease)?;

        let mut object = inner
            .objects
            .get(src)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(src.to_string()))?;
        if let Some(metadata) = metadata {
            object
                .metadata
                .extend(metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        let (remaining, outcome) = match inner.copy_behavior {
            CopyBehavior::Immediate | CopyBehavior::CompleteAfter(0) => {
                inner.objects.insert(dst.to_string(), object);
                return Ok(CopyStatus::Success);
            }
            CopyBehavior::FailAfter(0) => return Ok(CopyStatus::Failed),
            CopyBehavior::CompleteAfter(n) => (Some(n), CopyStatus::Success),
            CopyBehavior::FailAfter(n) => (Some(n), CopyStatus::Failed),
            CopyBehavior::NeverComplete => (None, CopyStatus::Pending),
        };

        inner.copies.insert(
            dst.to_string(),
            PendingCopy {
                object,
                remaining,
                outcome,
            },
        );
        Ok(CopyStatus::Pending)
    }

    async fn copy_status(&self, dst: &str) -> Result<CopyStatus, ClientError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.counts.copy_polls += 1;

        let Some(pending) = inner.copies.get_mut(dst) else {
            return Ok(if inner.objects.contains_key(dst) {
                CopyStatus::Success
            } else {
                CopyStatus::Failed
            });
        };

        match pending.remaining.as_mut() {
            None => return Ok(CopyStatus::Pending),
            Some(n) if *n > 1 => {
                *n -= 1;
                return Ok(CopyStatus::Pending);
            }
            Some(_) => {}
        }

        let Some(done) = inner.copies.remove(dst) else {
            return Ok(CopyStatus::Failed);
        };
        if done.outcome == CopyStatus::Success {
            inner.objects.insert(dst.to_string(), done.object);
        }
        Ok(done.outcome)
    }
}
