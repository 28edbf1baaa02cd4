//! Shared test scaffolding: a manually-advanced clock kept in lockstep with
//! `tokio::time::advance`, so throttle/debounce timestamps and TimeKeeper's
//! own virtual-time deadlines move together under `start_paused = true`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cyre::clock::Clock;

#[derive(Debug, Default)]
pub struct FakeClock {
    now_ms: AtomicU64,
}

impl FakeClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn advance(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
        tokio::time::advance(Duration::from_millis(ms)).await;
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

pub fn runtime_with_fake_clock() -> (cyre::Runtime, Arc<FakeClock>) {
    let clock = FakeClock::new();
    let runtime = cyre::Runtime::with_clock(cyre::RuntimeOptions::default(), clock.clone());
    (runtime, clock)
}
