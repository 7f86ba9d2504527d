use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use warp::Filter;
use warp::Rejection;
use warp::Reply;


lazy_static! {
    /// Claim and extend outcomes, labelled by `op` (claim|extend) and
    /// `result` (granted|denied|failed).
    pub static ref LEASE_REQUESTS: IntCounterVec = IntCounterVec::new(
        Opts::new("lease_requests_total", "Claim and extend requests by outcome"),
        &["op", "result"]
    )
    .expect("metric can not be created");

    pub static ref LEASE_EXPIRIES: IntCounter = IntCounter::new(
        "lease_expiries_total",
        "Leases expired by this coordinator"
    )
    .expect("metric can not be created");

    /// Stale-state conflicts reported by the store, by operation.
    pub static ref STORE_CONFLICTS: IntCounterVec = IntCounterVec::new(
        Opts::new("lease_store_conflicts_total", "Invalid responses from the lease store"),
        &["op"]
    )
    .expect("metric can not be created");

    pub static ref STORE_REFRESHES: IntCounter = IntCounter::new(
        "lease_store_refreshes_total",
        "Full snapshots pulled from the lease store"
    )
    .expect("metric can not be created");

    pub static ref MANAGER_FATAL_ERRORS: IntCounter = IntCounter::new(
        "lease_manager_fatal_errors_total",
        "Store failures that terminated a lease manager"
    )
    .expect("metric can not be created");

    pub static ref CACHED_LEASES: IntGauge = IntGauge::new(
        "lease_cached_leases",
        "Leases currently held according to the manager's cache"
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER: Once = Once::new();

fn register_custom_metrics() {
    REGISTER.call_once(|| {
        REGISTRY
            .register(Box::new(LEASE_REQUESTS.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(LEASE_EXPIRIES.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(STORE_CONFLICTS.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(STORE_REFRESHES.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(MANAGER_FATAL_ERRORS.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(CACHED_LEASES.clone()))
            .expect("collector can be registered");
    });
}

pub async fn start_server(
    port: u16,
    mut shutdown_signal: watch::Receiver<()>,
) {
    register_custom_metrics();

    let metrics_route = warp::path!("metrics").and_then(metrics_handler);

    info!("serving metrics on port {}", port);
    let (_, server) =
        warp::serve(metrics_route).bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
            let _ = shutdown_signal.changed().await;
        });
    server.await;
}

async fn metrics_handler() -> Result<impl Reply, Rejection> {
    Ok(gather_text())
}

/// Encode every registered collector in the prometheus text format.
pub fn gather_text() -> String {
    use prometheus::Encoder;

    register_custom_metrics();
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    };
    match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            error!("custom metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    }
}
