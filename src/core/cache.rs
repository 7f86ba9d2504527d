//! The manager's mirror of the store's lease set.
//!
//! Owned by the coordinator loop and never shared. Alongside the key→info
//! map it keeps an `(expiry, key)` index so the next wake time and the set
//! of due leases come out in order without scanning.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::time::SystemTime;

use super::LeaseInfo;
use super::LeaseKey;

#[derive(Debug, Default)]
pub(crate) struct LeaseCache {
    entries: HashMap<LeaseKey, LeaseInfo>,
    expiries: BTreeSet<(SystemTime, LeaseKey)>,
}

impl LeaseCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Swap in a fresh store snapshot. Returns the keys that were cached
    /// before and are absent now.
    pub(crate) fn replace(
        &mut self,
        snapshot: HashMap<LeaseKey, LeaseInfo>,
    ) -> Vec<LeaseKey> {
        let released = self
            .entries
            .keys()
            .filter(|key| !snapshot.contains_key(*key))
            .cloned()
            .collect();

        self.expiries = snapshot
            .iter()
            .map(|(key, info)| (info.expiry, key.clone()))
            .collect();
        self.entries = snapshot;

        released
    }

    pub(crate) fn insert(
        &mut self,
        key: LeaseKey,
        info: LeaseInfo,
    ) {
        if let Some(old) = self.entries.get(&key) {
            self.expiries.remove(&(old.expiry, key.clone()));
        }
        self.expiries.insert((info.expiry, key.clone()));
        self.entries.insert(key, info);
    }

    pub(crate) fn remove(
        &mut self,
        key: &LeaseKey,
    ) -> Option<LeaseInfo> {
        let info = self.entries.remove(key)?;
        self.expiries.remove(&(info.expiry, key.clone()));
        Some(info)
    }

    pub(crate) fn get(
        &self,
        key: &LeaseKey,
    ) -> Option<&LeaseInfo> {
        self.entries.get(key)
    }

    pub(crate) fn contains(
        &self,
        key: &LeaseKey,
    ) -> bool {
        self.entries.contains_key(key)
    }

    /// Whether `key` is held by anyone other than `holder`.
    pub(crate) fn held_by_other(
        &self,
        key: &LeaseKey,
        holder: &str,
    ) -> bool {
        self.entries.get(key).is_some_and(|info| info.holder != holder)
    }

    #[cfg(test)]
    pub(crate) fn next_expiry(&self) -> Option<SystemTime> {
        self.expiries.first().map(|(expiry, _)| *expiry)
    }

    /// Earliest expiry among keys not in `skip`.
    pub(crate) fn next_expiry_excluding(
        &self,
        skip: &HashSet<LeaseKey>,
    ) -> Option<SystemTime> {
        self.expiries
            .iter()
            .find(|(_, key)| !skip.contains(key))
            .map(|(expiry, _)| *expiry)
    }

    /// Keys whose expiry is at or before `now`, earliest first.
    pub(crate) fn due(
        &self,
        now: SystemTime,
    ) -> Vec<LeaseKey> {
        self.expiries
            .iter()
            .take_while(|(expiry, _)| *expiry <= now)
            .map(|(_, key)| key.clone())
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn is_due(
        &self,
        key: &LeaseKey,
        now: SystemTime,
    ) -> bool {
        self.entries.get(key).is_some_and(|info| info.is_expired_at(now))
    }

    pub(crate) fn namespace(
        &self,
        namespace: &str,
    ) -> HashMap<String, LeaseInfo> {
        self.entries
            .iter()
            .filter(|(key, _)| key.namespace == namespace)
            .map(|(key, info)| (key.name.clone(), info.clone()))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
