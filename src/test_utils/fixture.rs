//! A scripted [`LeaseStore`].
//!
//! Every call must match the next expected [`Call`] exactly. A matching call
//! first applies its effect to the fixture's leases, then returns the
//! scripted error or the natural answer from those leases. Anything
//! unexpected is recorded and answered with a backend error, which kills
//! the manager under test.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::LeaseInfo;
use crate::LeaseKey;
use crate::LeaseRequest;
use crate::LeaseStore;
use crate::StoreError;
use crate::StoreResult;

pub(crate) type Leases = HashMap<LeaseKey, LeaseInfo>;

type Effect = Box<dyn FnOnce(&mut Leases) + Send>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Expect {
    Refresh,
    Claim(LeaseKey, LeaseRequest),
    Extend(LeaseKey, LeaseRequest),
    Expire(LeaseKey),
}

pub(crate) struct Call {
    expect: Expect,
    err: Option<StoreError>,
    effect: Option<Effect>,
}

impl fmt::Debug for Call {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Call")
            .field("expect", &self.expect)
            .field("err", &self.err)
            .finish()
    }
}

impl Call {
    pub(crate) fn refresh() -> Self {
        Self::new(Expect::Refresh)
    }

    pub(crate) fn claim(
        key: LeaseKey,
        holder: &str,
        duration: Duration,
    ) -> Self {
        Self::new(Expect::Claim(key, LeaseRequest::new(holder, duration)))
    }

    pub(crate) fn extend(
        key: LeaseKey,
        holder: &str,
        duration: Duration,
    ) -> Self {
        Self::new(Expect::Extend(key, LeaseRequest::new(holder, duration)))
    }

    pub(crate) fn expire(key: LeaseKey) -> Self {
        Self::new(Expect::Expire(key))
    }

    pub(crate) fn err(
        mut self,
        err: StoreError,
    ) -> Self {
        self.err = Some(err);
        self
    }

    pub(crate) fn effect(
        mut self,
        effect: impl FnOnce(&mut Leases) + Send + 'static,
    ) -> Self {
        self.effect = Some(Box::new(effect));
        self
    }

    fn new(expect: Expect) -> Self {
        Self {
            expect,
            err: None,
            effect: None,
        }
    }
}

#[derive(Default)]
pub(crate) struct FixtureStore {
    leases: Mutex<Leases>,
    calls: Mutex<VecDeque<Call>>,
    failures: Mutex<Vec<String>>,
}

impl FixtureStore {
    pub(crate) fn new(
        leases: Leases,
        calls: Vec<Call>,
    ) -> Self {
        Self {
            leases: Mutex::new(leases),
            calls: Mutex::new(calls.into()),
            failures: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls_left(&self) -> usize {
        self.calls.lock().len()
    }

    /// Panics unless every expected call happened and nothing else did.
    pub(crate) fn assert_done(&self) {
        let failures = self.failures.lock();
        assert!(failures.is_empty(), "unexpected store calls: {failures:?}");
        let calls = self.calls.lock();
        assert!(calls.is_empty(), "store calls never made: {calls:?}");
    }

    fn call(
        &self,
        actual: Expect,
    ) -> StoreResult<()> {
        let next = self.calls.lock().pop_front();
        let call = match next {
            Some(call) if call.expect == actual => call,
            other => {
                let failure = format!("got {actual:?}, expected {other:?}");
                self.failures.lock().push(failure.clone());
                return Err(StoreError::Backend(failure));
            }
        };
        if let Some(effect) = call.effect {
            effect(&mut *self.leases.lock());
        }
        match call.err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn granted(
        &self,
        key: &LeaseKey,
    ) -> StoreResult<LeaseInfo> {
        self.leases
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::Backend(format!("fixture never granted {key}")))
    }
}

#[async_trait]
impl LeaseStore for FixtureStore {
    async fn refresh(&self) -> StoreResult<Leases> {
        self.call(Expect::Refresh)?;
        Ok(self.leases.lock().clone())
    }

    async fn claim_lease(
        &self,
        key: &LeaseKey,
        request: &LeaseRequest,
    ) -> StoreResult<LeaseInfo> {
        self.call(Expect::Claim(key.clone(), request.clone()))?;
        self.granted(key)
    }

    async fn extend_lease(
        &self,
        key: &LeaseKey,
        request: &LeaseRequest,
    ) -> StoreResult<LeaseInfo> {
        self.call(Expect::Extend(key.clone(), request.clone()))?;
        self.granted(key)
    }

    async fn expire_lease(
        &self,
        key: &LeaseKey,
    ) -> StoreResult<()> {
        self.call(Expect::Expire(key.clone()))?;
        self.leases.lock().remove(key);
        Ok(())
    }
}
