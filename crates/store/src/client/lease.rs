//! In-process lease bookkeeping.
//!
//! Object stores without a native lease primitive get their exclusive-write
//! tokens from here. Leases are advisory: they hold for writers going through
//! the same client instance, and expire on their own if never renewed.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use super::LeaseId;
use crate::error::ClientError;

#[derive(Debug, Clone)]
struct ActiveLease {
    id: LeaseId,
    duration: Duration,
    expires_at: Instant,
}

impl ActiveLease {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Table of active leases keyed by object key.
#[derive(Debug, Default)]
pub struct LeaseTable {
    leases: Mutex<HashMap<String, ActiveLease>>,
}

impl LeaseTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take an exclusive lease on `key`. Fails if a live lease is held.
    pub fn acquire(&self, key: &str, duration: Duration) -> Result<LeaseId, ClientError> {
        let now = Instant::now();
        let mut leases = self.leases.lock();

        if let Some(existing) = leases.get(key) {
            if existing.is_live(now) {
                return Err(ClientError::LeaseHeld(key.to_string()));
            }
        }

        let id = LeaseId::generate();
        leases.insert(
            key.to_string(),
            ActiveLease {
                id: id.clone(),
                duration,
                expires_at: now + duration,
            },
        );
        Ok(id)
    }

    /// Extend the lease on `key` by its original duration.
    pub fn renew(&self, key: &str, id: &LeaseId) -> Result<(), ClientError> {
        let now = Instant::now();
        let mut leases = self.leases.lock();

        match leases.get_mut(key) {
            Some(lease) if &lease.id == id => {
                lease.expires_at = now + lease.duration;
                Ok(())
            }
            _ => Err(ClientError::LeaseMismatch(key.to_string())),
        }
    }

    /// Release the lease on `key`. Missing or expired leases are fine;
    /// a live lease held under another id is not.
    pub fn release(&self, key: &str, id: &LeaseId) -> Result<(), ClientError> {
        let now = Instant::now();
        let mut leases = self.leases.lock();

        match leases.get(key) {
            None => Ok(()),
            Some(lease) if &lease.id == id || !lease.is_live(now) => {
                leases.remove(key);
                Ok(())
            }
            Some(_) => Err(ClientError::LeaseMismatch(key.to_string())),
        }
    }

    /// Check that a write to `key` is allowed under `id`.
    pub fn authorize(&self, key: &str, id: Option<&LeaseId>) -> Result<(), ClientError> {
        let now = Instant::now();
        let leases = self.leases.lock();

        match (leases.get(key), id) {
            (Some(lease), Some(id)) if lease.is_live(now) && &lease.id == id => Ok(()),
            (Some(lease), _) if lease.is_live(now) => Err(ClientError::LeaseHeld(key.to_string())),
            // a lease id against an unleased (or expired) key no longer authorises anything
            (_, Some(_)) => Err(ClientError::LeaseMismatch(key.to_string())),
            (_, None) => Ok(()),
        }
    }

    /// Drop whatever lease exists on `key`, used when the key is deleted.
    pub fn forget(&self, key: &str) {
        self.leases.lock().remove(key);
    }

    /// Number of live leases.
    pub fn active(&self) -> usize {
        let now = Instant::now();
        self.leases
            .lock()
            .values()
            .filter(|lease| lease.is_live(now))
            .count()
    }
}
