//! Time-bounded exclusive ownership of named resources.
//!
//! A [`LeaseManager`] is the single writer for one view of a shared
//! [`LeaseStore`]. Callers talk to it through a [`ManagerHandle`]; the
//! manager serializes their claims and extensions, keeps a cache of every
//! lease, and expires leases once their time is up.
mod config;
mod core;
mod errors;
mod metrics;
mod store;

pub use crate::config::*;
pub use crate::core::*;
pub use crate::errors::*;
pub use crate::metrics::*;
pub use crate::store::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub(crate) mod test_utils;
