mod support;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cyre::{ChannelConfig, Repeat};

#[tokio::test(start_paused = true)]
async fn repeat_count_fires_exactly_n_times() {
    let (runtime, _clock) = support::runtime_with_fake_clock();
    runtime
        .action(ChannelConfig::new("poll").interval(100).repeat(Repeat::Count(3)))
        .unwrap();

    let calls = Arc::new(AtomicU64::new(0));
    let counted = calls.clone();
    runtime.on(
        "poll",
        Arc::new(cyre::ValueFnHandler(move |p| {
            counted.fetch_add(1, Ordering::SeqCst);
            p
        })),
    );

    let outcome = runtime.call("poll", Some(serde_json::json!(null))).await;
    assert!(outcome.ok);
    assert_eq!(outcome.message, "scheduled");
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    for _ in 0..3 {
        tokio::time::advance(Duration::from_millis(100)).await;
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // No further fires past the configured count.
    tokio::time::advance(Duration::from_millis(500)).await;
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}
