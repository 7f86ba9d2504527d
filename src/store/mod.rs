//! The authoritative lease record the manager coordinates against.
//!
//! A store is shared by every manager in the cluster, so each mutating call
//! is conditional on the state the caller believes in. When that belief is
//! stale the store answers [`StoreError::Invalid`] and changes nothing.

mod memory;
pub use memory::*;

#[cfg(test)]
mod memory_test;

use std::collections::HashMap;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::LeaseInfo;
use crate::LeaseKey;
use crate::LeaseRequest;
use crate::StoreError;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait LeaseStore: Send + Sync + 'static {
    /// Current authoritative snapshot of every lease. Never `Invalid`.
    async fn refresh(&self) -> StoreResult<HashMap<LeaseKey, LeaseInfo>>;

    /// Take a free lease.
    ///
    /// Returns the granted lease, whose expiry may be later than
    /// `now + request.duration` but never earlier. `Invalid` if the key is
    /// held.
    async fn claim_lease(
        &self,
        key: &LeaseKey,
        request: &LeaseRequest,
    ) -> StoreResult<LeaseInfo>;

    /// Push out a lease the requester already holds.
    ///
    /// `Invalid` if the lease is free or held by someone else.
    async fn extend_lease(
        &self,
        key: &LeaseKey,
        request: &LeaseRequest,
    ) -> StoreResult<LeaseInfo>;

    /// Remove a lease whose expiry has passed.
    ///
    /// `Invalid` if the lease is gone or its expiry is still in the future,
    /// e.g. because it was extended since the caller last looked.
    async fn expire_lease(
        &self,
        key: &LeaseKey,
    ) -> StoreResult<()>;
}
