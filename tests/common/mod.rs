use std::sync::Arc;

use lease_coordinator::LeaseConfig;
use lease_coordinator::ManagerBuilder;
use lease_coordinator::ManagerHandle;
use lease_coordinator::MemoryStore;
use lease_coordinator::StoreConfig;
use lease_coordinator::SystemClock;

pub const NAMESPACE: &str = "application-leadership";

pub struct Worker {
    pub clock: SystemClock,
    pub store: Arc<MemoryStore>,
    pub handle: ManagerHandle,
}

/// A manager over a fresh in-memory store, sharing one clock with it.
pub fn start_worker() -> Worker {
    let clock = SystemClock::new();
    let store = Arc::new(MemoryStore::new(clock, &StoreConfig { grant_quantum_ms: 0 }));
    let handle = ManagerBuilder::new(LeaseConfig::default(), store.clone())
        .clock(clock)
        .spawn();
    Worker { clock, store, handle }
}

/// A second manager over the same store, standing in for another
/// coordinator in the cluster.
pub fn join_worker(worker: &Worker) -> ManagerHandle {
    ManagerBuilder::new(LeaseConfig::default(), worker.store.clone())
        .clock(worker.clock)
        .spawn()
}
