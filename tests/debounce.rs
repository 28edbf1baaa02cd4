mod support;

use std::sync::Arc;
use std::sync::Mutex;

use cyre::{ChannelConfig, HandlerReturn};

#[tokio::test(start_paused = true)]
async fn rapid_calls_collapse_into_one_trailing_invocation() {
    let (runtime, clock) = support::runtime_with_fake_clock();
    runtime.action(ChannelConfig::new("search").debounce(200)).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();
    runtime.on(
        "search",
        Arc::new(cyre::FnHandler(move |p| {
            recorder.lock().unwrap().push(p.clone());
            Ok(HandlerReturn::value(p))
        })),
    );

    let first = runtime.call("search", Some(serde_json::json!("a"))).await;
    assert!(first.ok);
    assert_eq!(first.message, "debounced");

    clock.advance(50).await;
    let second = runtime.call("search", Some(serde_json::json!("ab"))).await;
    assert!(second.ok);

    clock.advance(50).await;
    let third = runtime.call("search", Some(serde_json::json!("abc"))).await;
    assert!(third.ok);

    assert!(seen.lock().unwrap().is_empty(), "handler must not fire before the debounce window elapses");

    // Let the window elapse from the last call.
    clock.advance(250).await;
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }

    let recorded = seen.lock().unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0], serde_json::json!("abc"));
}
