mod support;

use std::sync::Arc;

use cyre::{ChannelConfig, CollectResults, ErrorStrategy, FnHandler, HandlerReturn, Strategy, ValueFnHandler};

#[tokio::test(start_paused = true)]
async fn parallel_with_continue_collects_every_member_outcome() {
    let (runtime, _clock) = support::runtime_with_fake_clock();
    runtime.action(ChannelConfig::new("jobs/one")).unwrap();
    runtime.action(ChannelConfig::new("jobs/two")).unwrap();
    runtime.action(ChannelConfig::new("jobs/three")).unwrap();

    runtime.on("jobs/one", Arc::new(ValueFnHandler(|p| p)));
    runtime.on("jobs/two", Arc::new(FnHandler(|_| Err("boom".to_string()))));
    runtime.on("jobs/three", Arc::new(ValueFnHandler(|p| p)));

    let group = runtime
        .group("jobs")
        .with_pattern("jobs/*")
        .with_strategy(Strategy::Parallel)
        .with_error_strategy(ErrorStrategy::Continue)
        .with_collect_results(CollectResults::All);

    let outcome = group.call(serde_json::json!(1)).await.unwrap();
    assert_eq!(outcome.results.len(), 3);
    let failed: Vec<_> = outcome.results.iter().filter(|r| !r.outcome.ok).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].channel_id, "jobs/two");
}

#[tokio::test(start_paused = true)]
async fn sequential_fail_fast_stops_after_first_failure_without_reporting_all_failed() {
    let (runtime, _clock) = support::runtime_with_fake_clock();
    runtime.action(ChannelConfig::new("jobs/one")).unwrap();
    runtime.action(ChannelConfig::new("jobs/two")).unwrap();

    runtime.on("jobs/one", Arc::new(FnHandler(|_| Err("boom".to_string()))));
    runtime.on("jobs/two", Arc::new(ValueFnHandler(|p| p)));

    let group = runtime
        .group("jobs")
        .with_pattern("jobs/*")
        .with_strategy(Strategy::Sequential)
        .with_error_strategy(ErrorStrategy::FailFast);

    // A single ordinary member failure under FailFast must still be an `Ok`
    // outcome carrying that one failed result, not `Err(AllFailed)`.
    let outcome = group.call(serde_json::json!(1)).await.unwrap();
    assert_eq!(outcome.results.len(), 1);
    assert!(!outcome.results[0].outcome.ok);
    assert_eq!(outcome.results[0].channel_id, "jobs/one");
}

#[tokio::test(start_paused = true)]
async fn waterfall_threads_each_members_output_into_the_next_call() {
    let (runtime, _clock) = support::runtime_with_fake_clock();
    runtime.action(ChannelConfig::new("jobs/one")).unwrap();
    runtime.action(ChannelConfig::new("jobs/two")).unwrap();

    runtime.on(
        "jobs/one",
        Arc::new(FnHandler(|p| {
            let n = p.as_i64().unwrap_or(0);
            Ok(HandlerReturn::value(serde_json::json!(n + 1)))
        })),
    );
    runtime.on(
        "jobs/two",
        Arc::new(FnHandler(|p| {
            let n = p.as_i64().unwrap_or(0);
            Ok(HandlerReturn::value(serde_json::json!(n * 10)))
        })),
    );

    let group = runtime
        .group("jobs")
        .with_pattern("jobs/*")
        .with_strategy(Strategy::Waterfall)
        .with_collect_results(CollectResults::All);

    let outcome = group.call(serde_json::json!(1)).await.unwrap();
    assert_eq!(outcome.results.len(), 2);
    assert_eq!(outcome.results[1].outcome.payload, Some(serde_json::json!(20)));
}

#[tokio::test(start_paused = true)]
async fn race_returns_as_soon_as_one_member_succeeds() {
    let (runtime, _clock) = support::runtime_with_fake_clock();
    runtime.action(ChannelConfig::new("jobs/one")).unwrap();
    runtime.action(ChannelConfig::new("jobs/two")).unwrap();

    runtime.on("jobs/one", Arc::new(FnHandler(|_| Err("boom".to_string()))));
    runtime.on("jobs/two", Arc::new(ValueFnHandler(|p| p)));

    let group = runtime.group("jobs").with_pattern("jobs/*").with_strategy(Strategy::Race);

    let outcome = group.call(serde_json::json!(7)).await.unwrap();
    assert!(outcome.results.iter().any(|r| r.outcome.ok));
}

#[tokio::test(start_paused = true)]
async fn race_reports_all_failed_only_when_every_member_loses() {
    let (runtime, _clock) = support::runtime_with_fake_clock();
    runtime.action(ChannelConfig::new("jobs/one")).unwrap();
    runtime.action(ChannelConfig::new("jobs/two")).unwrap();

    runtime.on("jobs/one", Arc::new(FnHandler(|_| Err("boom".to_string()))));
    runtime.on("jobs/two", Arc::new(FnHandler(|_| Err("boom".to_string()))));

    let group = runtime.group("jobs").with_pattern("jobs/*").with_strategy(Strategy::Race);

    let err = group.call(serde_json::json!(7)).await.unwrap_err();
    match err {
        cyre::error::GroupError::AllFailed { partial } => assert_eq!(partial.len(), 2),
        other => panic!("expected AllFailed, got {other:?}"),
    }
}
