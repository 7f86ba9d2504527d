//! Lease Coordination Error Hierarchy
//!
//! Separates business outcomes (a denied claim) from faults that terminate
//! the coordinator (anything the store reports other than a stale-state
//! conflict).

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The lease is held by someone else, or a concurrent claim won the race.
    #[error("lease claim denied")]
    LeaseClaimDenied,

    /// Unrecoverable store failure; the manager has stopped for good.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The manager was killed explicitly with the given reason.
    #[error("lease manager killed: {0}")]
    Killed(String),

    /// The manager shut down cleanly and accepts no more requests.
    #[error("lease manager stopped")]
    Stopped,

    /// Rejected before reaching the manager (empty names, zero duration...).
    #[error("invalid lease request: {0}")]
    InvalidRequest(String),

    /// Worker configuration validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for the ordinary "someone else has it" outcome.
    pub fn is_denied(&self) -> bool {
        matches!(self, Error::LeaseClaimDenied)
    }
}

/// Outcome kinds reported by a [`crate::LeaseStore`].
///
/// `Invalid` is the optimistic-concurrency sentinel: the caller's view of the
/// lease is stale. The manager absorbs it with a refresh; every other variant
/// is fatal to the manager.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("invalid lease operation")]
    Invalid,

    #[error("lease store unavailable: {0}")]
    Unavailable(String),

    /// The store answered, but with something that cannot be true.
    #[error("corrupt lease store response: {0}")]
    Corrupt(String),

    #[error("{0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_invalid(&self) -> bool {
        matches!(self, StoreError::Invalid)
    }
}
