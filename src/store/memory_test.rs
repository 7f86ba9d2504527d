use std::time::Duration;
use std::time::UNIX_EPOCH;

use tokio::time::advance;

use super::memory::round_up;
use super::*;
use crate::Clock;
use crate::LeaseInfo;
use crate::LeaseKey;
use crate::LeaseRequest;
use crate::StoreConfig;
use crate::StoreError;
use crate::SystemClock;

fn store(grant_quantum_ms: u64) -> (SystemClock, MemoryStore) {
    let clock = SystemClock::new();
    let store = MemoryStore::new(clock, &StoreConfig { grant_quantum_ms });
    (clock, store)
}

fn key(name: &str) -> LeaseKey {
    LeaseKey::new("application-leadership", name)
}

#[tokio::test(start_paused = true)]
async fn test_claim_free_lease() {
    let (clock, store) = store(0);
    let now = clock.now();

    let granted = store
        .claim_lease(&key("redis"), &LeaseRequest::new("redis/0", Duration::from_secs(60)))
        .await
        .unwrap();

    assert_eq!(granted, LeaseInfo::new("redis/0", now + Duration::from_secs(60)));
    assert_eq!(store.get(&key("redis")), Some(granted));
}

#[tokio::test(start_paused = true)]
async fn test_claim_held_lease_is_invalid() {
    let (_, store) = store(0);
    let request = LeaseRequest::new("redis/0", Duration::from_secs(60));
    store.claim_lease(&key("redis"), &request).await.unwrap();

    let other = LeaseRequest::new("redis/1", Duration::from_secs(60));
    let result = store.claim_lease(&key("redis"), &other).await;

    assert_eq!(result, Err(StoreError::Invalid));
    assert_eq!(store.get(&key("redis")).unwrap().holder, "redis/0");
}

#[tokio::test(start_paused = true)]
async fn test_grant_rounds_up_to_quantum() {
    let (clock, store) = store(1000);
    let now = clock.now();
    let duration = Duration::from_secs(60);

    let granted = store
        .claim_lease(&key("redis"), &LeaseRequest::new("redis/0", duration))
        .await
        .unwrap();

    assert!(granted.expiry >= now + duration);
    assert!(granted.expiry < now + duration + Duration::from_secs(1));
    let since_epoch = granted.expiry.duration_since(UNIX_EPOCH).unwrap();
    assert_eq!(since_epoch.as_nanos() % 1_000_000_000, 0);
}

#[tokio::test(start_paused = true)]
async fn test_extend_by_holder() {
    let (clock, store) = store(0);
    let start = clock.now();
    store
        .claim_lease(&key("redis"), &LeaseRequest::new("redis/0", Duration::from_secs(60)))
        .await
        .unwrap();

    advance(Duration::from_secs(30)).await;
    let granted = store
        .extend_lease(&key("redis"), &LeaseRequest::new("redis/0", Duration::from_secs(60)))
        .await
        .unwrap();

    assert_eq!(granted.expiry, start + Duration::from_secs(90));
}

#[tokio::test(start_paused = true)]
async fn test_extend_never_shortens() {
    let (clock, store) = store(0);
    let start = clock.now();
    store
        .claim_lease(&key("redis"), &LeaseRequest::new("redis/0", Duration::from_secs(60)))
        .await
        .unwrap();

    let granted = store
        .extend_lease(&key("redis"), &LeaseRequest::new("redis/0", Duration::from_secs(10)))
        .await
        .unwrap();

    assert_eq!(granted.expiry, start + Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn test_extend_by_other_holder_or_free_lease_is_invalid() {
    let (_, store) = store(0);
    let request = LeaseRequest::new("redis/1", Duration::from_secs(60));

    assert_eq!(store.extend_lease(&key("redis"), &request).await, Err(StoreError::Invalid));

    store
        .claim_lease(&key("redis"), &LeaseRequest::new("redis/0", Duration::from_secs(60)))
        .await
        .unwrap();
    assert_eq!(store.extend_lease(&key("redis"), &request).await, Err(StoreError::Invalid));
}

#[tokio::test(start_paused = true)]
async fn test_expire_only_after_deadline() {
    let (_, store) = store(0);
    store
        .claim_lease(&key("redis"), &LeaseRequest::new("redis/0", Duration::from_secs(60)))
        .await
        .unwrap();

    advance(Duration::from_secs(59)).await;
    assert_eq!(store.expire_lease(&key("redis")).await, Err(StoreError::Invalid));
    assert_eq!(store.len(), 1);

    advance(Duration::from_secs(1)).await;
    assert_eq!(store.expire_lease(&key("redis")).await, Ok(()));
    assert!(store.is_empty());

    // Gone now
    assert_eq!(store.expire_lease(&key("redis")).await, Err(StoreError::Invalid));
}

#[tokio::test(start_paused = true)]
async fn test_refresh_returns_snapshot() {
    let (clock, store) = store(0);
    let expiry = clock.now() + Duration::from_secs(10);
    store.insert(key("redis"), LeaseInfo::new("redis/0", expiry));
    store.insert(key("mysql"), LeaseInfo::new("mysql/2", expiry));

    let snapshot = store.refresh().await.unwrap();

    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[&key("mysql")].holder, "mysql/2");

    // Snapshot is a copy
    store.insert(key("kafka"), LeaseInfo::new("kafka/0", expiry));
    assert_eq!(snapshot.len(), 2);
}

#[test]
fn test_round_up_with_zero_quantum_is_identity() {
    let at = UNIX_EPOCH + Duration::from_millis(1500);
    assert_eq!(round_up(at, Duration::ZERO), at);
    assert_eq!(round_up(at, Duration::from_secs(1)), UNIX_EPOCH + Duration::from_secs(2));
    assert_eq!(
        round_up(UNIX_EPOCH + Duration::from_secs(2), Duration::from_secs(1)),
        UNIX_EPOCH + Duration::from_secs(2)
    );
}
