mod support;

use std::sync::Arc;
use std::time::Duration;

use cyre::{ChannelConfig, Repeat, ValueFnHandler};

#[tokio::test(start_paused = true)]
async fn destroying_a_branch_removes_every_descendant_channel_and_timer() {
    let (runtime, _clock) = support::runtime_with_fake_clock();

    let region = runtime.create_branch("region").unwrap();
    let worker = region.create_child("worker", None).unwrap();

    region.action(ChannelConfig::new("status")).unwrap();
    worker
        .action(ChannelConfig::new("heartbeat").interval(50).repeat(Repeat::Infinite))
        .unwrap();

    region.on("status", Arc::new(ValueFnHandler(|p| p)));
    worker.on("heartbeat", Arc::new(ValueFnHandler(|p| p)));

    // Arm the heartbeat's repeating timer before destroying the subtree.
    let armed = worker.call("heartbeat", Some(serde_json::json!(null))).await;
    assert!(armed.ok);

    assert!(runtime.get("region/status").is_some());
    assert!(runtime.get("region/worker/heartbeat").is_some());

    region.destroy();

    assert!(runtime.get("region/status").is_none());
    assert!(runtime.get("region/worker/heartbeat").is_none());
    assert!(!region.is_active());
    assert!(!worker.is_active());

    let after_status = region.call("status", Some(serde_json::json!(1))).await;
    assert!(!after_status.ok);

    // The cancelled timer must not keep firing into a now-deleted channel.
    tokio::time::advance(Duration::from_millis(500)).await;
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
    assert_eq!(runtime.channel_count(), 0);
}
