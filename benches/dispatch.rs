use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use cyre::{ChannelConfig, HandlerReturn, Runtime, ValueFnHandler};

fn fast_path_call(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let runtime = Runtime::new();
    runtime.action(ChannelConfig::new("bench/fast")).unwrap();
    runtime.on("bench/fast", Arc::new(ValueFnHandler(|p| p)));

    c.bench_function("fast_path_call", |b| {
        b.to_async(&rt).iter(|| async {
            let outcome = runtime.call("bench/fast", Some(serde_json::json!(1))).await;
            black_box(outcome);
        });
    });
}

fn full_pipeline_call(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let runtime = Runtime::new();
    runtime
        .action(
            ChannelConfig::new("bench/full")
                .detect_changes()
                .condition(|_| true)
                .transform(|p| p.clone()),
        )
        .unwrap();
    runtime.on(
        "bench/full",
        Arc::new(ValueFnHandler(|p| p)),
    );
    let _ = HandlerReturn::value(serde_json::json!(null));

    c.bench_function("full_pipeline_call", |b| {
        b.to_async(&rt).iter(|| async {
            let outcome = runtime.call("bench/full", Some(serde_json::json!({"n": 1}))).await;
            black_box(outcome);
        });
    });
}

criterion_group!(benches, fast_path_call, full_pipeline_call);
criterion_main!(benches);
