use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use super::lifecycle::Tomb;
use super::Clock;
use super::LeaseManager;
use super::ManagerHandle;
use super::SystemClock;
use crate::LeaseConfig;
use crate::LeaseStore;

/// Wires a [`LeaseManager`] to its store, clock and handles.
///
/// ```ignore
/// let store = Arc::new(MemoryStore::new(SystemClock::new(), &config.store));
/// let handle = ManagerBuilder::new(config.lease, store).spawn();
/// handle.claim("application-leadership", "redis", "redis/0", Duration::from_secs(60)).await?;
/// ```
pub struct ManagerBuilder<S, C = SystemClock>
where
    S: LeaseStore,
    C: Clock,
{
    config: LeaseConfig,
    store: Arc<S>,
    clock: C,
}

impl<S> ManagerBuilder<S>
where
    S: LeaseStore,
{
    pub fn new(
        config: LeaseConfig,
        store: Arc<S>,
    ) -> Self {
        Self {
            config,
            store,
            clock: SystemClock::new(),
        }
    }
}

impl<S, C> ManagerBuilder<S, C>
where
    S: LeaseStore,
    C: Clock,
{
    /// Replace the time source, typically to share one with the store.
    pub fn clock<C2: Clock>(
        self,
        clock: C2,
    ) -> ManagerBuilder<S, C2> {
        ManagerBuilder {
            config: self.config,
            store: self.store,
            clock,
        }
    }

    /// The manager and a handle to it. The manager does nothing until
    /// [`LeaseManager::run`] is polled.
    pub fn build(self) -> (LeaseManager<S, C>, ManagerHandle) {
        let (event_tx, event_rx) = mpsc::channel(self.config.event_channel_capacity);
        let tomb = Arc::new(Tomb::new());
        let handle = ManagerHandle::new(event_tx, tomb.clone(), self.config.max_lease_duration());
        let manager = LeaseManager::new(self.store, self.clock, self.config, event_rx, tomb);
        (manager, handle)
    }

    /// Build and run the manager on the current tokio runtime.
    ///
    /// The outcome is reported through [`ManagerHandle::wait`].
    pub fn spawn(self) -> ManagerHandle {
        let (manager, handle) = self.build();
        tokio::spawn(async move {
            if let Err(e) = manager.run().await {
                debug!("lease manager task exited: {}", e);
            }
        });
        handle
    }
}
