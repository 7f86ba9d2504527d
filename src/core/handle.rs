use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tracing::debug;

use super::event::LeaseEvent;
use super::event::Reply;
use super::lifecycle::Death;
use super::lifecycle::Tomb;
use super::lease::validate_namespace;
use super::LeaseInfo;
use super::LeaseKey;
use super::LeaseRequest;
use crate::Error;
use crate::Result;

/// Cheap, cloneable front door to a running [`crate::LeaseManager`].
///
/// Requests are validated here, queued to the manager loop and answered
/// once the loop has dealt with them. After the manager has died every
/// call fails with the reason it died.
#[derive(Debug, Clone)]
pub struct ManagerHandle {
    event_tx: mpsc::Sender<LeaseEvent>,
    tomb: Arc<Tomb>,
    max_lease_duration: Duration,
}

impl ManagerHandle {
    pub(crate) fn new(
        event_tx: mpsc::Sender<LeaseEvent>,
        tomb: Arc<Tomb>,
        max_lease_duration: Duration,
    ) -> Self {
        Self {
            event_tx,
            tomb,
            max_lease_duration,
        }
    }

    /// Take the free lease `namespace/name` for `holder`.
    ///
    /// Fails with [`Error::LeaseClaimDenied`] if anyone holds it, including
    /// `holder` itself; holders keep leases with [`ManagerHandle::extend`].
    pub async fn claim(
        &self,
        namespace: &str,
        name: &str,
        holder: &str,
        duration: Duration,
    ) -> Result<()> {
        let (key, request) = self.write_request(namespace, name, holder, duration)?;
        self.call(|reply| LeaseEvent::Claim { key, request, reply }).await
    }

    /// Keep `holder`'s lease for at least `duration` from now.
    ///
    /// Fails with [`Error::LeaseClaimDenied`] if `holder` does not hold it.
    pub async fn extend(
        &self,
        namespace: &str,
        name: &str,
        holder: &str,
        duration: Duration,
    ) -> Result<()> {
        let (key, request) = self.write_request(namespace, name, holder, duration)?;
        self.call(|reply| LeaseEvent::Extend { key, request, reply }).await
    }

    /// The manager's current view of one lease; never touches the store.
    pub async fn check(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<LeaseInfo>> {
        let key = LeaseKey::new(namespace, name);
        key.validate()?;
        self.call(|reply| LeaseEvent::Check { key, reply }).await
    }

    /// Every cached lease in `namespace`, by name.
    pub async fn leases(
        &self,
        namespace: &str,
    ) -> Result<HashMap<String, LeaseInfo>> {
        validate_namespace(namespace)?;
        let namespace = namespace.to_string();
        self.call(|reply| LeaseEvent::Leases { namespace, reply }).await
    }

    /// Resolves once `namespace/name` is no longer held, immediately if it
    /// is free now.
    pub async fn wait_until_expired(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<()> {
        let key = LeaseKey::new(namespace, name);
        key.validate()?;
        self.call(|reply| LeaseEvent::WaitUntilExpired { key, reply }).await
    }

    /// Ask the manager to stop. An in-flight store call completes; nothing
    /// queued behind it is processed.
    pub fn stop(&self) {
        debug!("lease manager stop requested");
        self.tomb.kill(Death::Stopped);
    }

    pub fn kill(
        &self,
        reason: impl Into<String>,
    ) {
        let reason = reason.into();
        debug!("lease manager kill requested: {}", reason);
        self.tomb.kill(Death::Killed(reason));
    }

    /// Blocks until the manager has terminated. `Ok` only after a clean
    /// [`ManagerHandle::stop`].
    pub async fn wait(&self) -> Result<()> {
        self.tomb.wait().await.to_result()
    }

    pub fn is_dead(&self) -> bool {
        self.tomb.is_dead()
    }

    /// A claim/extend surface bound to one namespace.
    pub fn claimer(
        &self,
        namespace: impl Into<String>,
    ) -> Result<Claimer> {
        Ok(Claimer {
            namespace: self.bind(namespace)?,
            handle: self.clone(),
        })
    }

    /// A read-only surface bound to one namespace.
    pub fn checker(
        &self,
        namespace: impl Into<String>,
    ) -> Result<Checker> {
        Ok(Checker {
            namespace: self.bind(namespace)?,
            handle: self.clone(),
        })
    }

    fn bind(
        &self,
        namespace: impl Into<String>,
    ) -> Result<String> {
        let namespace = namespace.into();
        validate_namespace(&namespace)?;
        Ok(namespace)
    }

    fn write_request(
        &self,
        namespace: &str,
        name: &str,
        holder: &str,
        duration: Duration,
    ) -> Result<(LeaseKey, LeaseRequest)> {
        let key = LeaseKey::new(namespace, name);
        key.validate()?;
        let request = LeaseRequest::new(holder, duration);
        request.validate(self.max_lease_duration)?;
        Ok((key, request))
    }

    async fn call<T>(
        &self,
        event: impl FnOnce(Reply<T>) -> LeaseEvent,
    ) -> Result<T> {
        if self.tomb.is_dying() {
            return Err(self.termination_error().await);
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        if self.event_tx.send(event(reply_tx)).await.is_err() {
            return Err(self.termination_error().await);
        }
        match reply_rx.await {
            Ok(result) => result,
            Err(_) => Err(self.termination_error().await),
        }
    }

    async fn termination_error(&self) -> Error {
        self.tomb.wait().await.to_error()
    }
}

/// Claims and extends leases in one namespace.
#[derive(Debug, Clone)]
pub struct Claimer {
    namespace: String,
    handle: ManagerHandle,
}

impl Claimer {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub async fn claim(
        &self,
        name: &str,
        holder: &str,
        duration: Duration,
    ) -> Result<()> {
        self.handle.claim(&self.namespace, name, holder, duration).await
    }

    pub async fn extend(
        &self,
        name: &str,
        holder: &str,
        duration: Duration,
    ) -> Result<()> {
        self.handle.extend(&self.namespace, name, holder, duration).await
    }
}

/// Reads leases in one namespace.
#[derive(Debug, Clone)]
pub struct Checker {
    namespace: String,
    handle: ManagerHandle,
}

impl Checker {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub async fn check(
        &self,
        name: &str,
    ) -> Result<Option<LeaseInfo>> {
        self.handle.check(&self.namespace, name).await
    }

    /// Whether `holder` holds `name` according to the manager's cache.
    pub async fn is_held_by(
        &self,
        name: &str,
        holder: &str,
    ) -> Result<bool> {
        Ok(self.check(name).await?.is_some_and(|info| info.holder == holder))
    }

    pub async fn leases(&self) -> Result<HashMap<String, LeaseInfo>> {
        self.handle.leases(&self.namespace).await
    }

    pub async fn wait_until_expired(
        &self,
        name: &str,
    ) -> Result<()> {
        self.handle.wait_until_expired(&self.namespace, name).await
    }
}
