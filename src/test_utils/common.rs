use std::sync::Arc;
use std::time::Duration;
use std::time::SystemTime;

use crate::Clock;
use crate::LeaseConfig;
use crate::LeaseKey;
use crate::LeaseStore;
use crate::ManagerBuilder;
use crate::ManagerHandle;
use crate::SystemClock;

pub(crate) const NAMESPACE: &str = "namespace";

pub(crate) fn key(name: &str) -> LeaseKey {
    LeaseKey::new(NAMESPACE, name)
}

/// Wall-clock time `d` after now on `clock`.
pub(crate) fn offset(
    clock: &SystemClock,
    d: Duration,
) -> SystemTime {
    clock.now() + d
}

/// Timers fire on whole milliseconds, so "almost" and "just after" keep a
/// millisecond of slack either side of an expiry.
pub(crate) fn almost_seconds(secs: u64) -> Duration {
    Duration::from_secs(secs) - Duration::from_millis(1)
}

pub(crate) fn just_after_seconds(secs: u64) -> Duration {
    Duration::from_secs(secs) + Duration::from_millis(1)
}

pub(crate) fn spawn_manager<S: LeaseStore>(
    store: Arc<S>,
    clock: SystemClock,
) -> ManagerHandle {
    ManagerBuilder::new(LeaseConfig::default(), store).clock(clock).spawn()
}
