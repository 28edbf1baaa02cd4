mod support;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cyre::timekeeper::MAX_TIMEOUT_MS;
use cyre::ChannelConfig;

#[tokio::test(start_paused = true)]
async fn a_delay_beyond_the_native_timer_range_is_chunked_but_fires_exactly_once() {
    let (runtime, _clock) = support::runtime_with_fake_clock();
    let long_delay_ms = MAX_TIMEOUT_MS + 5_000;
    runtime.action(ChannelConfig::new("long-wait").delay(long_delay_ms)).unwrap();

    let calls = Arc::new(AtomicU64::new(0));
    let counted = calls.clone();
    runtime.on(
        "long-wait",
        Arc::new(cyre::ValueFnHandler(move |p| {
            counted.fetch_add(1, Ordering::SeqCst);
            p
        })),
    );

    let outcome = runtime.call("long-wait", Some(serde_json::json!(1))).await;
    assert!(outcome.ok);
    assert_eq!(outcome.message, "scheduled");

    // The first native wakeup lands on the MAX_TIMEOUT_MS chunk boundary,
    // not the semantic deadline: it must rearm silently instead of firing.
    tokio::time::advance(Duration::from_millis(MAX_TIMEOUT_MS)).await;
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // The remaining 5s chunk reaches the real deadline.
    tokio::time::advance(Duration::from_millis(5_000)).await;
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // No further fires: this channel has no repeat configured.
    tokio::time::advance(Duration::from_millis(MAX_TIMEOUT_MS)).await;
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn a_delay_at_exactly_the_native_limit_is_not_chunked() {
    let (runtime, _clock) = support::runtime_with_fake_clock();
    runtime.action(ChannelConfig::new("at-limit").delay(MAX_TIMEOUT_MS)).unwrap();

    let calls = Arc::new(AtomicU64::new(0));
    let counted = calls.clone();
    runtime.on(
        "at-limit",
        Arc::new(cyre::ValueFnHandler(move |p| {
            counted.fetch_add(1, Ordering::SeqCst);
            p
        })),
    );

    runtime.call("at-limit", Some(serde_json::json!(1))).await;

    tokio::time::advance(Duration::from_millis(MAX_TIMEOUT_MS)).await;
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
