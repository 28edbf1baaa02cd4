mod support;

use std::sync::Arc;

use cyre::{ChannelConfig, FnHandler, HandlerReturn};

#[tokio::test(start_paused = true)]
async fn handler_chain_link_resolves_to_the_next_channels_outcome() {
    let (runtime, _clock) = support::runtime_with_fake_clock();
    runtime.action(ChannelConfig::new("step-a")).unwrap();
    runtime.action(ChannelConfig::new("step-b")).unwrap();

    runtime.on(
        "step-a",
        Arc::new(FnHandler(|payload| {
            let n = payload.as_i64().unwrap_or(0);
            Ok(HandlerReturn::chain("step-b", serde_json::json!(n + 1)))
        })),
    );
    runtime.on(
        "step-b",
        Arc::new(FnHandler(|payload| {
            let n = payload.as_i64().unwrap_or(0);
            Ok(HandlerReturn::value(serde_json::json!(n * 10)))
        })),
    );

    let outcome = runtime.call("step-a", Some(serde_json::json!(4))).await;
    assert!(outcome.ok);
    assert_eq!(outcome.payload, Some(serde_json::json!(50)));
}

#[tokio::test(start_paused = true)]
async fn chain_depth_limit_terminates_a_cycle() {
    let (runtime, _clock) = support::runtime_with_fake_clock();
    runtime
        .action(ChannelConfig::new("ping"))
        .unwrap();
    runtime
        .action(ChannelConfig::new("pong"))
        .unwrap();

    runtime.on("ping", Arc::new(FnHandler(|p| Ok(HandlerReturn::chain("pong", p)))));
    runtime.on("pong", Arc::new(FnHandler(|p| Ok(HandlerReturn::chain("ping", p)))));

    let outcome = runtime.call("ping", Some(serde_json::json!(1))).await;
    assert!(!outcome.ok);
    assert_eq!(outcome.code, Some(cyre::error::codes::CALL_CHAIN_DEPTH_EXCEEDED));
}
