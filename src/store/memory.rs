use std::collections::HashMap;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;
use tracing::trace;

use super::LeaseStore;
use super::StoreResult;
use crate::Clock;
use crate::LeaseInfo;
use crate::LeaseKey;
use crate::LeaseRequest;
use crate::StoreConfig;
use crate::StoreError;
use crate::SystemClock;

/// Process-local [`LeaseStore`].
///
/// Keeps no history and survives nothing; useful for a single worker, for
/// embedding, and as a well-behaved peer in tests. Grants are rounded up to
/// `grant_quantum_ms`, so a holder may get slightly more time than it asked
/// for, never less.
#[derive(Debug)]
pub struct MemoryStore<C: Clock = SystemClock> {
    clock: C,
    grant_quantum: Duration,
    leases: Mutex<HashMap<LeaseKey, LeaseInfo>>,
}

impl<C: Clock> MemoryStore<C> {
    pub fn new(
        clock: C,
        config: &StoreConfig,
    ) -> Self {
        Self {
            clock,
            grant_quantum: Duration::from_millis(config.grant_quantum_ms),
            leases: Mutex::new(HashMap::new()),
        }
    }

    /// Seed or overwrite a lease directly, bypassing the claim protocol.
    /// Stands in for another coordinator writing to a shared store.
    pub fn insert(
        &self,
        key: LeaseKey,
        info: LeaseInfo,
    ) {
        self.leases.lock().insert(key, info);
    }

    pub fn get(
        &self,
        key: &LeaseKey,
    ) -> Option<LeaseInfo> {
        self.leases.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.leases.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases.lock().is_empty()
    }

    fn grant_expiry(
        &self,
        duration: Duration,
    ) -> StoreResult<SystemTime> {
        let wanted = self
            .clock
            .now()
            .checked_add(duration)
            .ok_or_else(|| StoreError::Backend(format!("lease duration {duration:?} overflows")))?;
        Ok(round_up(wanted, self.grant_quantum))
    }
}

#[async_trait]
impl<C: Clock> LeaseStore for MemoryStore<C> {
    async fn refresh(&self) -> StoreResult<HashMap<LeaseKey, LeaseInfo>> {
        let leases = self.leases.lock().clone();
        trace!("refresh: {} leases", leases.len());
        Ok(leases)
    }

    async fn claim_lease(
        &self,
        key: &LeaseKey,
        request: &LeaseRequest,
    ) -> StoreResult<LeaseInfo> {
        let expiry = self.grant_expiry(request.duration)?;
        let mut leases = self.leases.lock();
        if leases.contains_key(key) {
            debug!("claim {} by {}: already held", key, request.holder);
            return Err(StoreError::Invalid);
        }
        let info = LeaseInfo::new(request.holder.clone(), expiry);
        leases.insert(key.clone(), info.clone());
        Ok(info)
    }

    async fn extend_lease(
        &self,
        key: &LeaseKey,
        request: &LeaseRequest,
    ) -> StoreResult<LeaseInfo> {
        let expiry = self.grant_expiry(request.duration)?;
        let mut leases = self.leases.lock();
        match leases.get_mut(key) {
            Some(info) if info.holder == request.holder => {
                // Extending never shortens a lease.
                info.expiry = info.expiry.max(expiry);
                Ok(info.clone())
            }
            _ => {
                debug!("extend {} by {}: not the holder", key, request.holder);
                Err(StoreError::Invalid)
            }
        }
    }

    async fn expire_lease(
        &self,
        key: &LeaseKey,
    ) -> StoreResult<()> {
        let now = self.clock.now();
        let mut leases = self.leases.lock();
        match leases.get(key) {
            Some(info) if info.is_expired_at(now) => {
                leases.remove(key);
                Ok(())
            }
            _ => Err(StoreError::Invalid),
        }
    }
}

/// Round `at` up to the next multiple of `quantum` since the epoch.
pub(super) fn round_up(
    at: SystemTime,
    quantum: Duration,
) -> SystemTime {
    let quantum_nanos = quantum.as_nanos();
    if quantum_nanos == 0 {
        return at;
    }
    let Ok(since_epoch) = at.duration_since(UNIX_EPOCH) else {
        return at;
    };
    let remainder = since_epoch.as_nanos() % quantum_nanos;
    if remainder == 0 {
        return at;
    }
    // remainder < quantum_nanos, which came from a Duration, so it fits in u64.
    let pad = Duration::from_nanos((quantum_nanos - remainder) as u64);
    at.checked_add(pad).unwrap_or(at)
}
