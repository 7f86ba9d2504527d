//! Shared fixtures for the crate's unit tests.
mod common;
mod fixture;

pub use common::*;
pub use fixture::*;
