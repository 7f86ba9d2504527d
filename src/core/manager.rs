//! The lease coordinator.
//!
//! One task owns the cache, talks to the store and answers every caller.
//! Each loop iteration reacts to exactly one of: a stop/kill request, the
//! wake timer, or one caller request. The timer fires at the earliest cached
//! expiry, or `max_sleep` after the last refresh when that comes first.
//! Store calls are awaited inline, so at most one is ever in flight and the
//! cache always reflects the sequence of store replies seen so far.

use std::collections::HashMap;
use std::collections::HashSet;
use std::future::pending;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::mpsc;
use tokio::time::Sleep;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::cache::LeaseCache;
use super::event::LeaseEvent;
use super::event::Reply;
use super::lifecycle::Death;
use super::lifecycle::DeathGuard;
use super::lifecycle::Tomb;
use super::Clock;
use super::LeaseInfo;
use super::LeaseKey;
use super::LeaseRequest;
use super::SystemClock;
use crate::metrics;
use crate::Error;
use crate::LeaseConfig;
use crate::LeaseStore;
use crate::Result;
use crate::StoreError;
use crate::StoreResult;

/// A request is evaluated at most this many times: once, then once more
/// after the refresh forced by an `Invalid` answer.
const MAX_ATTEMPTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteOp {
    Claim,
    Extend,
}

impl WriteOp {
    fn as_str(self) -> &'static str {
        match self {
            WriteOp::Claim => "claim",
            WriteOp::Extend => "extend",
        }
    }

    /// Whether the cache alone is enough to refuse the request.
    fn blocked_by(
        self,
        cache: &LeaseCache,
        key: &LeaseKey,
        holder: &str,
    ) -> bool {
        match self {
            WriteOp::Claim => cache.contains(key),
            WriteOp::Extend => cache.held_by_other(key, holder),
        }
    }
}

pub struct LeaseManager<S, C = SystemClock>
where
    S: LeaseStore,
    C: Clock,
{
    store: Arc<S>,
    clock: C,
    config: LeaseConfig,

    cache: LeaseCache,

    // Callers waiting for a key to leave the cache
    blocks: HashMap<LeaseKey, Vec<Reply<()>>>,

    // Due leases the store refused to expire. They are retried at
    // `retry_at`; other leases keep expiring on time meanwhile.
    refused: HashSet<LeaseKey>,
    retry_at: Option<SystemTime>,

    last_refresh: SystemTime,

    event_rx: mpsc::Receiver<LeaseEvent>,
    tomb: Arc<Tomb>,
}

impl<S, C> LeaseManager<S, C>
where
    S: LeaseStore,
    C: Clock,
{
    pub(crate) fn new(
        store: Arc<S>,
        clock: C,
        config: LeaseConfig,
        event_rx: mpsc::Receiver<LeaseEvent>,
        tomb: Arc<Tomb>,
    ) -> Self {
        let last_refresh = clock.now();
        Self {
            store,
            clock,
            config,
            cache: LeaseCache::new(),
            blocks: HashMap::new(),
            refused: HashSet::new(),
            retry_at: None,
            last_refresh,
            event_rx,
            tomb,
        }
    }

    /// Runs until stopped, killed, or a store failure.
    ///
    /// Whatever ends the loop, every queued request and every blocked waiter
    /// is answered with the termination error before this returns, and
    /// handles waiting on the manager are released.
    pub async fn run(mut self) -> Result<()> {
        let _guard = DeathGuard(self.tomb.clone());
        info!("lease manager starting");

        match self.main_loop().await {
            Ok(()) => self.tomb.kill(Death::Stopped),
            Err(e) => {
                error!("lease manager stopped by store failure: {}", e);
                metrics::MANAGER_FATAL_ERRORS.inc();
                self.tomb.kill(Death::Store(e));
            }
        }

        let death = self.tomb.cause();
        self.drain(&death);
        self.tomb.mark_dead();

        match &death {
            Death::Stopped => info!("lease manager stopped"),
            other => warn!("lease manager terminated: {:?}", other),
        }
        death.to_result()
    }

    async fn main_loop(&mut self) -> StoreResult<()> {
        self.refresh().await?;
        let now = self.clock.now();
        if !self.cache.due(now).is_empty() {
            // Just refreshed; no need for another snapshot before expiring.
            self.expire_due(now).await?;
        }

        loop {
            let tick = self.next_wake().map(|at| self.clock.sleep_until(at));
            trace!("next wake: {:?}", self.next_wake());

            tokio::select! {
                // Use biased to ensure branch order
                biased;
                // P0: stop or kill requested
                _ = self.tomb.dying() => {
                    debug!("lease manager dying: {:?}", self.tomb.cause());
                    return Ok(());
                }
                // P1: earliest expiry or periodic refresh reached
                _ = wake(tick) => {
                    let now = self.clock.now();
                    self.on_tick(now).await?;
                }
                // P2: caller requests
                event = self.event_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event).await?,
                        None => {
                            info!("all lease manager handles dropped");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    fn next_wake(&self) -> Option<SystemTime> {
        let expiry = self.cache.next_expiry_excluding(&self.refused);
        let retry = self.retry_at.filter(|_| !self.refused.is_empty());
        [expiry, retry, self.refresh_deadline()].into_iter().flatten().min()
    }

    /// When the cache is old enough to be refreshed with nothing due.
    fn refresh_deadline(&self) -> Option<SystemTime> {
        self.last_refresh.checked_add(self.config.max_sleep())
    }

    async fn on_tick(
        &mut self,
        now: SystemTime,
    ) -> StoreResult<()> {
        if self.retry_at.is_some_and(|retry_at| retry_at <= now) {
            self.retry_at = None;
            self.refused.clear();
        }

        let expiring = self.cache.due(now).iter().any(|key| !self.refused.contains(key));
        let stale = self.refresh_deadline().is_some_and(|at| at <= now);
        if !expiring && !stale {
            return Ok(());
        }
        if !expiring {
            debug!("no refresh for {:?}, refreshing lease cache", self.config.max_sleep());
        }
        self.refresh().await?;
        self.expire_due(now).await
    }

    /// Expire every lease the cache shows as due at `now`.
    ///
    /// Each key is tried at most once per tick, and keys already refused are
    /// left alone until `retry_at`. An `Invalid` answer means our view of that
    /// lease was stale: refresh and carry on with whatever the new snapshot
    /// says is due.
    async fn expire_due(
        &mut self,
        now: SystemTime,
    ) -> StoreResult<()> {
        let mut attempted = self.refused.clone();

        loop {
            let next = self.cache.due(now).into_iter().find(|key| !attempted.contains(key));
            let Some(key) = next else {
                break;
            };
            attempted.insert(key.clone());

            match self.store.expire_lease(&key).await {
                Ok(()) => {
                    info!("lease {} expired", key);
                    metrics::LEASE_EXPIRIES.inc();
                    self.cache.remove(&key);
                    self.release(&key);
                    metrics::CACHED_LEASES.set(self.cache.len() as i64);
                }
                Err(StoreError::Invalid) => {
                    warn!("expire {}: store state changed, refreshing", key);
                    metrics::STORE_CONFLICTS.with_label_values(&["expire"]).inc();
                    self.refresh().await?;
                }
                Err(e) => {
                    error!("expire {} failed: {}", key, e);
                    return Err(e);
                }
            }
        }

        self.refused = self.cache.due(now).into_iter().collect();
        if self.refused.is_empty() {
            self.retry_at = None;
        } else if self.retry_at.is_none() {
            let retry_at = now + self.config.expire_retry_interval();
            warn!(
                "store refused to expire {} due leases; retrying at {:?}",
                self.refused.len(),
                retry_at
            );
            self.retry_at = Some(retry_at);
        }
        Ok(())
    }

    /// Forget refusals for keys that are gone or no longer due.
    fn settle_refused(&mut self) {
        if self.refused.is_empty() {
            return;
        }
        let now = self.clock.now();
        let cache = &self.cache;
        self.refused
            .retain(|key| cache.get(key).is_some_and(|info| info.is_expired_at(now)));
        if self.refused.is_empty() {
            self.retry_at = None;
        }
    }

    async fn refresh(&mut self) -> StoreResult<()> {
        let snapshot = self.store.refresh().await?;
        self.last_refresh = self.clock.now();
        metrics::STORE_REFRESHES.inc();
        debug!("refreshed lease cache: {} leases", snapshot.len());

        for key in self.cache.replace(snapshot) {
            self.release(&key);
        }
        self.settle_refused();
        metrics::CACHED_LEASES.set(self.cache.len() as i64);
        Ok(())
    }

    /// Answer everyone waiting for `key` to become free.
    fn release(
        &mut self,
        key: &LeaseKey,
    ) {
        if let Some(waiters) = self.blocks.remove(key) {
            debug!("lease {} released; waking {} waiters", key, waiters.len());
            for waiter in waiters {
                let _ = waiter.send(Ok(()));
            }
        }
    }

    async fn handle_event(
        &mut self,
        event: LeaseEvent,
    ) -> StoreResult<()> {
        debug!("receive lease event: {}", event.name());

        match event {
            LeaseEvent::Claim { key, request, reply } => {
                let outcome = self.write(WriteOp::Claim, &key, &request).await;
                answer(WriteOp::Claim, reply, outcome)
            }
            LeaseEvent::Extend { key, request, reply } => {
                let outcome = self.write(WriteOp::Extend, &key, &request).await;
                answer(WriteOp::Extend, reply, outcome)
            }
            LeaseEvent::Check { key, reply } => {
                let _ = reply.send(Ok(self.cache.get(&key).cloned()));
                Ok(())
            }
            LeaseEvent::Leases { namespace, reply } => {
                let _ = reply.send(Ok(self.cache.namespace(&namespace)));
                Ok(())
            }
            LeaseEvent::WaitUntilExpired { key, reply } => {
                if self.cache.contains(&key) {
                    let waiters = self.blocks.entry(key).or_default();
                    waiters.retain(|waiter| !waiter.is_closed());
                    waiters.push(reply);
                } else {
                    let _ = reply.send(Ok(()));
                }
                Ok(())
            }
        }
    }

    /// Claim or extend `key`, absorbing at most one store conflict.
    ///
    /// `Ok(true)` when granted, `Ok(false)` when denied, `Err` only for
    /// failures that must stop the manager.
    async fn write(
        &mut self,
        op: WriteOp,
        key: &LeaseKey,
        request: &LeaseRequest,
    ) -> StoreResult<bool> {
        for attempt in 1..=MAX_ATTEMPTS {
            if op.blocked_by(&self.cache, key, &request.holder) {
                debug!(
                    "{} {} by {}: held by {:?}",
                    op.as_str(),
                    key,
                    request.holder,
                    self.cache.get(key).map(|info| &info.holder)
                );
                return Ok(false);
            }

            let requested_at = self.clock.now();
            let result = match op {
                WriteOp::Claim => self.store.claim_lease(key, request).await,
                WriteOp::Extend => self.store.extend_lease(key, request).await,
            };

            match result {
                Ok(granted) => {
                    self.accept_grant(op, key, request, requested_at, granted)?;
                    return Ok(true);
                }
                Err(StoreError::Invalid) => {
                    metrics::STORE_CONFLICTS.with_label_values(&[op.as_str()]).inc();
                    if attempt == MAX_ATTEMPTS {
                        warn!("{} {} by {}: conflict after refresh, denying", op.as_str(), key, request.holder);
                        return Ok(false);
                    }
                    warn!("{} {} by {}: store state changed, refreshing", op.as_str(), key, request.holder);
                    self.refresh().await?;
                }
                Err(e) => {
                    error!("{} {} failed: {}", op.as_str(), key, e);
                    return Err(e);
                }
            }
        }
        Ok(false)
    }

    /// Cache a grant after checking it is one we could have asked for.
    fn accept_grant(
        &mut self,
        op: WriteOp,
        key: &LeaseKey,
        request: &LeaseRequest,
        requested_at: SystemTime,
        granted: LeaseInfo,
    ) -> StoreResult<()> {
        if granted.holder != request.holder {
            return Err(StoreError::Corrupt(format!(
                "{} of {} for {} granted to {}",
                op.as_str(),
                key,
                request.holder,
                granted.holder
            )));
        }
        let long_enough = granted
            .expiry
            .duration_since(requested_at)
            .is_ok_and(|granted_for| granted_for >= request.duration);
        if !long_enough {
            return Err(StoreError::Corrupt(format!(
                "{} of {} granted until {:?}, short of the requested {:?}",
                op.as_str(),
                key,
                granted.expiry,
                request.duration
            )));
        }

        info!(
            "{} {} granted to {} until {:?}",
            op.as_str(),
            key,
            granted.holder,
            granted.expiry
        );
        self.cache.insert(key.clone(), granted);
        self.settle_refused();
        metrics::CACHED_LEASES.set(self.cache.len() as i64);
        Ok(())
    }

    /// Answer everything still queued or blocked with the termination error.
    fn drain(
        &mut self,
        death: &Death,
    ) {
        self.event_rx.close();
        let mut rejected = 0;
        while let Ok(event) = self.event_rx.try_recv() {
            event.reject(death.to_error());
            rejected += 1;
        }
        for (_, waiters) in self.blocks.drain() {
            for waiter in waiters {
                let _ = waiter.send(Err(death.to_error()));
                rejected += 1;
            }
        }
        if rejected > 0 {
            debug!("rejected {} pending requests", rejected);
        }
    }

    #[cfg(test)]
    pub(crate) fn cache(&self) -> &LeaseCache {
        &self.cache
    }
}

fn answer(
    op: WriteOp,
    reply: Reply<()>,
    outcome: StoreResult<bool>,
) -> StoreResult<()> {
    match outcome {
        Ok(true) => {
            metrics::LEASE_REQUESTS.with_label_values(&[op.as_str(), "granted"]).inc();
            let _ = reply.send(Ok(()));
            Ok(())
        }
        Ok(false) => {
            metrics::LEASE_REQUESTS.with_label_values(&[op.as_str(), "denied"]).inc();
            let _ = reply.send(Err(Error::LeaseClaimDenied));
            Ok(())
        }
        Err(e) => {
            metrics::LEASE_REQUESTS.with_label_values(&[op.as_str(), "failed"]).inc();
            let _ = reply.send(Err(Error::Store(e.clone())));
            Err(e)
        }
    }
}

async fn wake(tick: Option<Sleep>) {
    match tick {
        Some(sleep) => sleep.await,
        None => pending().await,
    }
}
