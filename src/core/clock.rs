//! Time source for lease expiry.
//!
//! Lease expiries are absolute wall-clock instants, but the manager has to
//! sleep until them. [`SystemClock`] pins a wall-clock reading to a tokio
//! [`Instant`] once and derives everything else from tokio's clock, so a
//! runtime with paused time (`tokio::time::pause`/`advance`) moves both
//! together and expiry tests never wait in real time.

use std::time::Duration;
use std::time::SystemTime;

use tokio::time::sleep_until;
use tokio::time::Instant;
use tokio::time::Sleep;

/// Stand-in for deadlines too far out for an `Instant` to represent.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

pub trait Clock: Send + Sync + 'static {
    /// Current wall-clock time.
    fn now(&self) -> SystemTime;

    /// A timer that completes once [`Clock::now`] reaches `deadline`.
    /// Deadlines in the past complete immediately.
    fn sleep_until(
        &self,
        deadline: SystemTime,
    ) -> Sleep;
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    anchor_instant: Instant,
    anchor_time: SystemTime,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            anchor_instant: Instant::now(),
            anchor_time: SystemTime::now(),
        }
    }

    fn instant_at(
        &self,
        deadline: SystemTime,
    ) -> Instant {
        match deadline.duration_since(self.anchor_time) {
            Ok(offset) => instant_after(self.anchor_instant, offset),
            // Before the anchor: already due.
            Err(_) => self.anchor_instant,
        }
    }
}

/// `anchor + offset`, clamped to [`FAR_FUTURE`] from now when that does not
/// fit in an `Instant`.
pub(super) fn instant_after(
    anchor: Instant,
    offset: Duration,
) -> Instant {
    anchor
        .checked_add(offset)
        .unwrap_or_else(|| Instant::now() + FAR_FUTURE)
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        self.anchor_time + Instant::now().saturating_duration_since(self.anchor_instant)
    }

    fn sleep_until(
        &self,
        deadline: SystemTime,
    ) -> Sleep {
        sleep_until(self.instant_at(deadline))
    }
}

impl<C: Clock> Clock for std::sync::Arc<C> {
    fn now(&self) -> SystemTime {
        (**self).now()
    }

    fn sleep_until(
        &self,
        deadline: SystemTime,
    ) -> Sleep {
        (**self).sleep_until(deadline)
    }
}

