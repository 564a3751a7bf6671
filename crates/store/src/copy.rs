//! Lease-coordinated copy or move of one object to another key.
//!
//! Object store copies run server-side and may complete asynchronously, so a
//! copy holds an exclusive lease on both keys for its whole lifetime:
//!
//! 1. lease the destination, then the source
//! 2. start the copy, authorised by the destination lease
//! 3. while the copy is pending: sleep, re-read its status, renew both leases
//! 4. on success, delete the source if moving
//!
//! Both leases are broken on every exit path. Polling is bounded by
//! [`CopyPolicy::max_polls`] and can be interrupted through a shutdown
//! `watch` channel.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::client::{CopyStatus, LeaseId, Metadata, ObjectClient};
use crate::error::{ClientError, PublishError, Result};

/// Timing and bounds for copy/move operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CopyPolicy {
    /// Lease duration on both keys, in seconds
    pub lease_duration_secs: u64,
    /// Sleep between copy status polls, in milliseconds
    pub poll_interval_ms: u64,
    /// Give up after this many pending polls; `None` polls until the store
    /// reports a terminal status
    pub max_polls: Option<u32>,
}

impl Default for CopyPolicy {
    fn default() -> Self {
        Self {
            lease_duration_secs: 30,
            poll_interval_ms: 1000,
            max_polls: Some(600),
        }
    }
}

impl CopyPolicy {
    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.lease_duration_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Whether the source survives the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    Copy,
    Move,
}

impl fmt::Display for CopyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyMode::Copy => f.write_str("copy"),
            CopyMode::Move => f.write_str("move"),
        }
    }
}

/// Which side of a copy a lease protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseRole {
    Source,
    Destination,
}

impl fmt::Display for LeaseRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeaseRole::Source => f.write_str("source"),
            LeaseRole::Destination => f.write_str("destination"),
        }
    }
}

/// A held lease, broken when released or dropped.
///
/// [`LeaseGuard::release`] breaks the lease in place. A guard dropped without
/// being released (its task was cancelled) breaks the lease from a spawned
/// task instead; outside a runtime the lease is left to expire.
pub(crate) struct LeaseGuard {
    client: Arc<dyn ObjectClient>,
    key: String,
    id: LeaseId,
    role: LeaseRole,
    released: bool,
}

impl LeaseGuard {
    async fn acquire(
        client: &Arc<dyn ObjectClient>,
        key: &str,
        role: LeaseRole,
        duration: Duration,
    ) -> std::result::Result<Self, ClientError> {
        let id = client.acquire_lease(key, duration).await?;
        debug!(key = %key, role = %role, lease = %id, "lease acquired");
        Ok(Self {
            client: client.clone(),
            key: key.to_string(),
            id,
            role,
            released: false,
        })
    }

    fn id(&self) -> &LeaseId {
        &self.id
    }

    async fn renew(&self) -> std::result::Result<(), ClientError> {
        self.client.renew_lease(&self.key, &self.id).await
    }

    async fn release(mut self) {
        self.released = true;
        match self.client.break_lease(&self.key, &self.id).await {
            Ok(()) => debug!(key = %self.key, role = %self.role, "lease released"),
            Err(e) => warn!(key = %self.key, role = %self.role, error = %e, "failed to break lease"),
        }
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let client = self.client.clone();
        let key = std::mem::take(&mut self.key);
        let id = self.id.clone();
        let role = self.role;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = client.break_lease(&key, &id).await {
                        warn!(key = %key, role = %role, error = %e, "failed to break abandoned lease");
                    }
                });
            }
            Err(_) => {
                warn!(key = %key, role = %role, "lease abandoned outside a runtime, leaving it to expire")
            }
        }
    }
}

/// Performs copy/move operations against one object store.
#[derive(Debug, Clone)]
pub struct CopyCoordinator {
    client: Arc<dyn ObjectClient>,
    policy: CopyPolicy,
    storage: String,
    shutdown: Option<watch::Receiver<()>>,
}

impl CopyCoordinator {
    /// `storage` names the owning published storage in error context.
    pub fn new(client: Arc<dyn ObjectClient>, policy: CopyPolicy, storage: String) -> Self {
        Self {
            client,
            policy,
            storage,
            shutdown: None,
        }
    }

    /// Abort pending copies once a value is sent on `shutdown`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<()>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn policy(&self) -> &CopyPolicy {
        &self.policy
    }

    /// Copy (or move) the object at absolute key `src` to absolute key `dst`.
    ///
    /// `metadata` is attached to the destination on top of the source's own.
    pub async fn copy_or_move(
        &self,
        src: &str,
        dst: &str,
        metadata: Option<&Metadata>,
        mode: CopyMode,
    ) -> Result<()> {
        if src == dst && metadata.is_none() {
            debug!(key = %src, mode = %mode, "source and destination are the same, nothing to do");
            return Ok(());
        }

        let duration = self.policy.lease_duration();

        let dst_lease =
            LeaseGuard::acquire(&self.client, dst, LeaseRole::Destination, duration)
                .await
                .map_err(|source| self.lease_acquire_error(LeaseRole::Destination, dst, source))?;

        let result = if src == dst {
            // rewriting metadata in place, one lease covers both sides
            self.drive(src, dst, metadata, CopyMode::Copy, &dst_lease, &dst_lease)
                .await
        } else {
            self.copy_leased(src, dst, metadata, mode, &dst_lease, duration)
                .await
        };

        dst_lease.release().await;
        result
    }

    async fn copy_leased(
        &self,
        src: &str,
        dst: &str,
        metadata: Option<&Metadata>,
        mode: CopyMode,
        dst_lease: &LeaseGuard,
        duration: Duration,
    ) -> Result<()> {
        match LeaseGuard::acquire(&self.client, src, LeaseRole::Source, duration).await {
            Ok(src_lease) => {
                let result = self
                    .drive(src, dst, metadata, mode, &src_lease, dst_lease)
                    .await;
                src_lease.release().await;
                result
            }
            Err(source) => Err(self.lease_acquire_error(LeaseRole::Source, src, source)),
        }
    }

    /// Start the copy and poll it to a terminal status.
    async fn drive(
        &self,
        src: &str,
        dst: &str,
        metadata: Option<&Metadata>,
        mode: CopyMode,
        src_lease: &LeaseGuard,
        dst_lease: &LeaseGuard,
    ) -> Result<()> {
        let mut status = self
            .client
            .start_copy(src, dst, metadata, Some(dst_lease.id()))
            .await
            .map_err(|source| PublishError::CopyStart {
                src: src.to_string(),
                dst: dst.to_string(),
                storage: self.storage.clone(),
                source,
            })?;

        let mut shutdown = self.shutdown.clone();
        let mut polls = 0u32;

        loop {
            match status {
                CopyStatus::Success => break,
                CopyStatus::Pending => {
                    if self.policy.max_polls.is_some_and(|max| polls >= max) {
                        return Err(PublishError::CopyTimeout {
                            src: src.to_string(),
                            dst: dst.to_string(),
                            storage: self.storage.clone(),
                            polls,
                        });
                    }
                    polls += 1;

                    if self.pause(&mut shutdown).await {
                        return Err(PublishError::CopyCancelled {
                            src: src.to_string(),
                            dst: dst.to_string(),
                            storage: self.storage.clone(),
                        });
                    }

                    status = self.client.copy_status(dst).await.map_err(|source| {
                        PublishError::Properties {
                            path: dst.to_string(),
                            storage: self.storage.clone(),
                            source,
                        }
                    })?;

                    dst_lease
                        .renew()
                        .await
                        .map_err(|source| self.lease_renew_error(LeaseRole::Destination, dst, source))?;
                    src_lease
                        .renew()
                        .await
                        .map_err(|source| self.lease_renew_error(LeaseRole::Source, src, source))?;
                    debug!(src = %src, dst = %dst, polls, status = %status, "polled copy");
                }
                other => {
                    return Err(PublishError::CopyFailed {
                        src: src.to_string(),
                        dst: dst.to_string(),
                        storage: self.storage.clone(),
                        status: other,
                    })
                }
            }
        }

        if mode == CopyMode::Move {
            self.client
                .delete_object(src, Some(src_lease.id()))
                .await
                .map_err(|source| PublishError::MoveCleanup {
                    src: src.to_string(),
                    storage: self.storage.clone(),
                    source,
                })?;
        }

        info!(src = %src, dst = %dst, mode = %mode, polls, "copy complete");
        Ok(())
    }

    /// Sleep one poll interval. Returns true when shutdown was signalled.
    async fn pause(&self, shutdown: &mut Option<watch::Receiver<()>>) -> bool {
        let sleep = tokio::time::sleep(self.policy.poll_interval());
        tokio::pin!(sleep);

        if let Some(rx) = shutdown.as_mut() {
            tokio::select! {
                _ = &mut sleep => return false,
                changed = rx.changed() => {
                    if changed.is_ok() {
                        return true;
                    }
                }
            }
            // sender is gone, nobody can cancel us any more
            *shutdown = None;
        }

        sleep.await;
        false
    }

    fn lease_acquire_error(&self, role: LeaseRole, key: &str, source: ClientError) -> PublishError {
        PublishError::LeaseAcquire {
            role,
            key: key.to_string(),
            storage: self.storage.clone(),
            source,
        }
    }

    fn lease_renew_error(&self, role: LeaseRole, key: &str, source: ClientError) -> PublishError {
        PublishError::LeaseRenew {
            role,
            key: key.to_string(),
            storage: self.storage.clone(),
            source,
        }
    }
}
