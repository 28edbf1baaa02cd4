use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::time::Instant as TokioInstant;

use crate::breathing::Breathing;
use crate::clock::Clock;
use crate::timekeeper::{TimeKeeper, MAX_TIMEOUT_MS};

pub type TimerCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// How many times a timer should fire after its first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatSpec {
    Once,
    Count(u64),
    Infinite,
}

/// Everything needed to schedule one timer.
#[derive(Clone)]
pub struct ScheduleSpec {
    /// A human-readable label, normally the fully-qualified channel id this
    /// timer belongs to. Used by prefix cancellation (cascading destroy).
    pub label: String,
    pub delay_ms: u64,
    pub interval_ms: Option<u64>,
    pub repeat: RepeatSpec,
    pub callback: TimerCallback,
}

/// A live reference to a scheduled timer.
#[derive(Clone)]
pub struct TimerHandle {
    pub id: u64,
    pub(crate) keeper: TimeKeeper,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.keeper.cancel(self.id);
    }

    pub fn pause(&self) {
        self.keeper.pause(self.id);
    }

    pub fn resume(&self) {
        self.keeper.resume(self.id);
    }
}

pub enum Command {
    Schedule { id: u64, spec: ScheduleSpec },
    Cancel { id: u64 },
    CancelByLabelPrefix { prefix: String },
    Pause { id: Option<u64> },
    Resume { id: Option<u64> },
    Shutdown,
}

struct TimerState {
    label: String,
    /// Milliseconds remaining until the next *semantic* fire (not the next
    /// native wakeup, which may be an intermediate chunk boundary).
    remaining_ms: u64,
    interval_ms: Option<u64>,
    repeat: RepeatSpec,
    original_duration_ms: u64,
    chunked: bool,
    paused: bool,
    /// Wall-clock deadline for the next native wakeup, recomputed whenever
    /// the timer is (re)armed or resumed.
    deadline: TokioInstant,
    callback: TimerCallback,
}

/// The scheduling loop. Owns every timer and the single source of "what
/// fires next".
pub(crate) struct Wheel {
    clock: Arc<dyn Clock>,
    breathing: Arc<Breathing>,
    commands: mpsc::UnboundedReceiver<Command>,
    timers: HashMap<u64, TimerState>,
    /// Min-heap of (deadline, id) so the loop always knows the next wakeup
    /// without rescanning every timer.
    heap: BinaryHeap<Reverse<(TokioInstant, u64)>>,
}

impl Wheel {
    pub fn new(clock: Arc<dyn Clock>, breathing: Arc<Breathing>, commands: mpsc::UnboundedReceiver<Command>) -> Self {
        Self { clock, breathing, commands, timers: HashMap::new(), heap: BinaryHeap::new() }
    }

    pub async fn run(mut self) {
        loop {
            let next_deadline = self.heap.peek().map(|Reverse((deadline, _))| *deadline);

            tokio::select! {
                biased;
                cmd = self.commands.recv() => {
                    match cmd {
                        Some(Command::Shutdown) => return,
                        Some(cmd) => self.handle_command(cmd),
                        None => return,
                    }
                }
                _ = sleep_until_or_pending(next_deadline) => {
                    self.fire_due();
                }
            }
        }
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Schedule { id, spec } => self.schedule(id, spec),
            Command::Cancel { id } => {
                self.timers.remove(&id);
            }
            Command::CancelByLabelPrefix { prefix } => {
                self.timers.retain(|_, state| !crate::store::id_has_prefix(&state.label, &prefix));
            }
            Command::Pause { id: Some(id) } => self.pause_one(id),
            Command::Pause { id: None } => {
                let ids: Vec<u64> = self.timers.keys().copied().collect();
                for id in ids {
                    self.pause_one(id);
                }
            }
            Command::Resume { id: Some(id) } => self.resume_one(id),
            Command::Resume { id: None } => {
                let ids: Vec<u64> = self.timers.keys().copied().collect();
                for id in ids {
                    self.resume_one(id);
                }
            }
            Command::Shutdown => {
                self.timers.clear();
                self.heap.clear();
            }
        }
    }

    fn schedule(&mut self, id: u64, spec: ScheduleSpec) {
        let native_delay = spec.delay_ms.min(MAX_TIMEOUT_MS);
        let chunked = spec.delay_ms > MAX_TIMEOUT_MS;
        let deadline = TokioInstant::now() + Duration::from_millis(native_delay);
        let state = TimerState {
            label: spec.label,
            remaining_ms: spec.delay_ms,
            interval_ms: spec.interval_ms,
            repeat: spec.repeat,
            original_duration_ms: spec.delay_ms,
            chunked,
            paused: false,
            deadline,
            callback: spec.callback,
        };
        self.heap.push(Reverse((deadline, id)));
        self.timers.insert(id, state);
    }

    fn pause_one(&mut self, id: u64) {
        if let Some(state) = self.timers.get_mut(&id) {
            if !state.paused {
                let remaining_native =
                    state.deadline.saturating_duration_since(TokioInstant::now()).as_millis() as u64;
                state.remaining_ms = remaining_native.min(state.remaining_ms);
                state.paused = true;
            }
        }
    }

    fn resume_one(&mut self, id: u64) {
        if let Some(state) = self.timers.get_mut(&id) {
            if state.paused {
                state.paused = false;
                let native = state.remaining_ms.min(MAX_TIMEOUT_MS);
                state.deadline = TokioInstant::now() + Duration::from_millis(native);
                self.heap.push(Reverse((state.deadline, id)));
            }
        }
    }

    /// Pops every heap entry whose deadline has passed and processes it.
    /// Stale heap entries (from a timer that was rescheduled or paused
    /// since being pushed) are detected by comparing the popped deadline
    /// against the timer's current deadline and silently dropped.
    fn fire_due(&mut self) {
        let now = TokioInstant::now();
        while let Some(Reverse((deadline, id))) = self.heap.peek().copied() {
            if deadline > now {
                break;
            }
            self.heap.pop();

            let Some(state) = self.timers.get(&id) else { continue };
            if state.paused || state.deadline != deadline {
                continue;
            }

            self.process_wakeup(id);
        }
    }

    fn process_wakeup(&mut self, id: u64) {
        let native_elapsed_ms = {
            let state = self.timers.get(&id).unwrap();
            state.remaining_ms.min(MAX_TIMEOUT_MS)
        };

        let is_real_fire = {
            let state = self.timers.get_mut(&id).unwrap();
            state.remaining_ms = state.remaining_ms.saturating_sub(native_elapsed_ms);
            state.remaining_ms == 0
        };

        if !is_real_fire {
            // Intermediate chunk boundary: rearm for the remainder without
            // invoking the callback or touching repeat/breathing state.
            let state = self.timers.get_mut(&id).unwrap();
            let native = state.remaining_ms.min(MAX_TIMEOUT_MS);
            state.deadline = TokioInstant::now() + Duration::from_millis(native);
            self.heap.push(Reverse((state.deadline, id)));
            return;
        }

        let state = self.timers.get(&id).unwrap();
        let callback = state.callback.clone();
        crate::observability::timer_fired(&state.label, state.chunked, self.clock.now_ms());
        tokio::spawn(callback());

        self.rearm_after_fire(id);
    }

    fn rearm_after_fire(&mut self, id: u64) {
        let should_repeat = {
            let Some(state) = self.timers.get_mut(&id) else { return };
            match state.repeat {
                RepeatSpec::Once => false,
                RepeatSpec::Infinite => true,
                RepeatSpec::Count(n) => {
                    if n <= 1 {
                        false
                    } else {
                        state.repeat = RepeatSpec::Count(n - 1);
                        true
                    }
                }
            }
        };

        if !should_repeat {
            self.timers.remove(&id);
            return;
        }

        let rate = self.breathing.current_rate();
        let state = self.timers.get_mut(&id).unwrap();
        let base_interval = state.interval_ms.unwrap_or(state.original_duration_ms).max(1);
        let adjusted = ((base_interval as f64) * rate).round() as u64;
        state.remaining_ms = adjusted.max(1);
        state.original_duration_ms = state.remaining_ms;
        state.chunked = state.remaining_ms > MAX_TIMEOUT_MS;
        let native = state.remaining_ms.min(MAX_TIMEOUT_MS);
        state.deadline = TokioInstant::now() + Duration::from_millis(native);
        self.heap.push(Reverse((state.deadline, id)));
    }
}

/// Sleeps until `deadline`, or never resolves if `deadline` is `None` — lets
/// the `select!` loop block purely on the command channel when no timer is
/// scheduled.
async fn sleep_until_or_pending(deadline: Option<TokioInstant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
