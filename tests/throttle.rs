mod support;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cyre::{ChannelConfig, ValueFnHandler};

#[tokio::test(start_paused = true)]
async fn second_call_within_window_is_throttled() {
    let (runtime, clock) = support::runtime_with_fake_clock();
    runtime.action(ChannelConfig::new("sensor").throttle(100)).unwrap();

    let calls = Arc::new(AtomicU64::new(0));
    let counted = calls.clone();
    runtime.on(
        "sensor",
        Arc::new(ValueFnHandler(move |p| {
            counted.fetch_add(1, Ordering::SeqCst);
            p
        })),
    );

    let first = runtime.call("sensor", Some(serde_json::json!(1))).await;
    assert!(first.ok);

    let second = runtime.call("sensor", Some(serde_json::json!(2))).await;
    assert!(!second.ok);
    assert_eq!(second.code, Some(cyre::error::codes::CALL_THROTTLED));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    clock.advance(150).await;

    let third = runtime.call("sensor", Some(serde_json::json!(3))).await;
    assert!(third.ok);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
