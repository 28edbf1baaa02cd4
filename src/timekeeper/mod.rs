//! TimeKeeper: the single timing authority for delayed and repeating work.
//!
//! One background task owns every timer. It does not know what a "channel"
//! is — it operates on opaque callbacks — which keeps the scheduling
//! algorithm (chunking, pausing, breathing-adjusted intervals) testable in
//! isolation from dispatch. Driven by a `tokio::select!` loop over an
//! incoming command channel and the next deadline, the same shape used by
//! the scheduler this module is grounded on.

mod wheel;

pub use wheel::{RepeatSpec, ScheduleSpec, TimerHandle};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::breathing::Breathing;
use crate::clock::Clock;
use crate::timekeeper::wheel::{Command, Wheel};

/// Platform-safe maximum single-timer duration. Mirrors the ~24.8 day cap
/// imposed by 32-bit millisecond timer APIs; any requested delay beyond this
/// is chunked into internal re-schedules rather than handed to the
/// underlying async runtime in one call.
pub const MAX_TIMEOUT_MS: u64 = i32::MAX as u64;

/// Handle to the running TimeKeeper. Cloning shares the same background
/// task and timer set.
#[derive(Clone)]
pub struct TimeKeeper {
    next_id: Arc<AtomicU64>,
    commands: mpsc::UnboundedSender<Command>,
}

impl TimeKeeper {
    pub fn spawn(clock: Arc<dyn Clock>, breathing: Arc<Breathing>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let wheel = Wheel::new(clock, breathing, rx);
        tokio::spawn(wheel.run());
        Self { next_id: Arc::new(AtomicU64::new(1)), commands: tx }
    }

    /// Schedules a one-shot or repeating callback. Returns a [`TimerHandle`]
    /// the caller can use to cancel, pause, or resume just this timer.
    pub fn schedule(&self, spec: ScheduleSpec) -> TimerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = TimerHandle { id, keeper: self.clone() };
        let _ = self.commands.send(Command::Schedule { id, spec });
        handle
    }

    pub fn cancel(&self, id: u64) {
        let _ = self.commands.send(Command::Cancel { id });
    }

    pub fn pause(&self, id: u64) {
        let _ = self.commands.send(Command::Pause { id: Some(id) });
    }

    pub fn resume(&self, id: u64) {
        let _ = self.commands.send(Command::Resume { id: Some(id) });
    }

    pub fn pause_all(&self) {
        let _ = self.commands.send(Command::Pause { id: None });
    }

    pub fn resume_all(&self) {
        let _ = self.commands.send(Command::Resume { id: None });
    }

    /// Cancels every timer whose id carries the given fully-qualified
    /// channel id prefix. Used by cascading branch destruction.
    pub fn cancel_prefix(&self, prefix: String) {
        let _ = self.commands.send(Command::CancelByLabelPrefix { prefix });
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}
