//! Monotonic time source.
//!
//! A single function returning milliseconds since an arbitrary, process-local
//! epoch. Kept as a trait, rather than calling `Instant::now()` directly from
//! every stage, so tests can advance it deterministically alongside
//! `tokio::time::pause`/`advance` without the runtime itself depending on the
//! paused clock — [`TimeKeeper`](crate::timekeeper::TimeKeeper) still uses
//! real `tokio::time::sleep_until` deadlines, it just timestamps its own
//! bookkeeping (`lastInvokeTime`, debounce windows) off of [`Clock`].

use std::time::Instant;

/// A monotonic point in time, expressed in milliseconds since the clock's
/// epoch. Never wraps for any realistic process lifetime (a `u64` of
/// milliseconds covers hundreds of millions of years).
pub type MillisSinceEpoch = u64;

/// Abstracts "what time is it" so the dispatch engine and TimeKeeper never
/// call `Instant::now()` directly.
pub trait Clock: Send + Sync + 'static {
    fn now_ms(&self) -> MillisSinceEpoch;
}

/// The production clock: wall-clock monotonic time anchored to process start.
#[derive(Debug)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { epoch: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> MillisSinceEpoch {
        self.epoch.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_monotonic_nondecreasing() {
        let clock = SystemClock::new();
        let a = clock.now_ms();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = clock.now_ms();
        assert!(b >= a);
    }
}
