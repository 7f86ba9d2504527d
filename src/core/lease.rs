use std::fmt;
use std::time::Duration;
use std::time::SystemTime;

use crate::Error;
use crate::Result;

/// Identifies one lease: a name inside a namespace.
///
/// Ordered by namespace first so one namespace's leases sit together in the
/// cache's expiry index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LeaseKey {
    pub namespace: String,
    pub name: String,
}

impl LeaseKey {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        validate_part("namespace", &self.namespace)?;
        validate_part("lease name", &self.name)
    }
}

impl fmt::Display for LeaseKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Who holds a lease and until when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseInfo {
    pub holder: String,
    pub expiry: SystemTime,
}

impl LeaseInfo {
    pub fn new(
        holder: impl Into<String>,
        expiry: SystemTime,
    ) -> Self {
        Self {
            holder: holder.into(),
            expiry,
        }
    }

    pub fn is_expired_at(
        &self,
        now: SystemTime,
    ) -> bool {
        self.expiry <= now
    }
}

/// A claim or extension: `holder` wants the lease for at least `duration`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseRequest {
    pub holder: String,
    pub duration: Duration,
}

impl LeaseRequest {
    pub fn new(
        holder: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            holder: holder.into(),
            duration,
        }
    }

    pub(crate) fn validate(
        &self,
        max_duration: Duration,
    ) -> Result<()> {
        validate_part("holder", &self.holder)?;
        if self.duration.is_zero() {
            return Err(Error::InvalidRequest("lease duration must be positive".into()));
        }
        if self.duration > max_duration {
            return Err(Error::InvalidRequest(format!(
                "lease duration {:?} exceeds maximum {:?}",
                self.duration, max_duration
            )));
        }
        Ok(())
    }
}

pub(crate) fn validate_namespace(namespace: &str) -> Result<()> {
    validate_part("namespace", namespace)
}

fn validate_part(
    what: &str,
    value: &str,
) -> Result<()> {
    if value.is_empty() {
        return Err(Error::InvalidRequest(format!("{what} must not be empty")));
    }
    Ok(())
}
