mod builder;
mod cache;
mod clock;
mod event;
mod handle;
mod lease;
mod lifecycle;
mod manager;

pub use builder::*;
pub use clock::*;
pub use handle::*;
pub use lease::*;
pub use manager::*;

#[cfg(test)]
mod clock_test;
