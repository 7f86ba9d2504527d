use std::time::Duration;

use tokio::time::advance;
use tokio::time::Instant;

use super::clock::instant_after;
use super::Clock;
use super::SystemClock;

#[tokio::test(start_paused = true)]
async fn test_now_follows_paused_time() {
    let clock = SystemClock::new();
    let start = clock.now();

    advance(Duration::from_secs(90)).await;

    assert_eq!(clock.now().duration_since(start).unwrap(), Duration::from_secs(90));
}

#[tokio::test(start_paused = true)]
async fn test_sleep_until_fires_at_deadline() {
    let clock = SystemClock::new();
    let deadline = clock.now() + Duration::from_secs(5);
    let sleep = clock.sleep_until(deadline);
    tokio::pin!(sleep);

    advance(Duration::from_millis(4999)).await;
    assert!(futures::poll!(sleep.as_mut()).is_pending());

    advance(Duration::from_millis(2)).await;
    assert!(futures::poll!(sleep.as_mut()).is_ready());
    assert!(clock.now() >= deadline);
}

#[tokio::test(start_paused = true)]
async fn test_sleep_until_past_deadline_is_immediate() {
    let clock = SystemClock::new();
    let deadline = clock.now() - Duration::from_secs(5);

    let started = tokio::time::Instant::now();
    clock.sleep_until(deadline).await;

    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_shared_clock() {
    let clock = std::sync::Arc::new(SystemClock::new());
    let copy = clock.clone();

    advance(Duration::from_secs(1)).await;

    assert_eq!(clock.now(), copy.now());
}

#[test]
fn test_instant_after_clamps_overflow() {
    let anchor = Instant::now();

    assert_eq!(instant_after(anchor, Duration::from_secs(5)), anchor + Duration::from_secs(5));
    let clamped = instant_after(anchor, Duration::MAX);
    assert!(clamped > anchor + Duration::from_secs(86400 * 365));
}

#[tokio::test(start_paused = true)]
async fn test_sleep_until_far_future_never_fires() {
    let clock = SystemClock::new();
    let now = clock.now();
    let deadline = [u64::MAX, i64::MAX as u64, 1 << 62, 1 << 40]
        .into_iter()
        .find_map(|secs| now.checked_add(Duration::from_secs(secs)))
        .unwrap();

    let sleep = clock.sleep_until(deadline);
    tokio::pin!(sleep);

    advance(Duration::from_secs(86400)).await;
    assert!(futures::poll!(sleep.as_mut()).is_pending());
}
