//! The dispatch engine: the call path.
//!
//! Looks up the channel, runs its compiled pipeline in canonical order,
//! invokes the handler, and resolves the handler's return — including
//! following a chain link before the original caller sees a result.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::breathing::Breathing;
use crate::channel::{ChannelConfig, CompiledChannel, Mode, Priority, StageKind};
use crate::clock::Clock;
use crate::error::{CallError, CallMetadata};
use crate::handler::HandlerReturn;
use crate::payload::{deep_equal, Payload};
use crate::store::{ChannelStore, PayloadCache, SubscriberStore};
use crate::timekeeper::{RepeatSpec, ScheduleSpec, TimeKeeper};

/// Default bound on chain length, matching the spec's "tail call, not a
/// tree" guarantee: a runaway `A -> B -> A -> B -> ...` chain terminates
/// instead of recursing forever.
pub const DEFAULT_CHAIN_DEPTH_LIMIT: usize = 100;

/// The result of a `call`, in full.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub ok: bool,
    pub payload: Option<Payload>,
    pub message: String,
    /// The stable [`crate::error::codes`] string for a rejection; `None` on
    /// success.
    pub code: Option<&'static str>,
    pub metadata: CallMetadata,
}

impl CallOutcome {
    fn ok(payload: Option<Payload>, message: impl Into<String>) -> Self {
        Self { ok: true, payload, message: message.into(), code: None, metadata: CallMetadata::default() }
    }

    pub(crate) fn err(err: CallError) -> Self {
        let mut metadata = CallMetadata::default();
        match &err {
            CallError::Throttled { retry_in_ms } => metadata.retry_in_ms = Some(*retry_in_ms),
            CallError::SchemaInvalid(errs) => metadata.schema_errors = errs.clone(),
            _ => {}
        }
        Self { ok: false, payload: None, message: err.to_string(), code: Some(err.code()), metadata }
    }
}

/// Everything the dispatch engine needs, shared by `Arc` across the
/// runtime, every branch, and every TimeKeeper callback.
pub struct Dispatcher {
    pub store: Arc<ChannelStore>,
    pub subscribers: Arc<SubscriberStore>,
    pub cache: Arc<PayloadCache>,
    pub timekeeper: Arc<TimeKeeper>,
    pub breathing: Arc<Breathing>,
    pub clock: Arc<dyn Clock>,
    pub chain_depth_limit: usize,
    pub shutdown: AtomicBool,
}

impl Dispatcher {
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub fn set_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn call<'a>(self: &'a Arc<Self>, id: &'a str, payload: Option<Payload>) -> BoxFuture<'a, CallOutcome> {
        crate::observability::call_entered(id);
        Box::pin(async move {
            let outcome = self.dispatch(id, payload, 0).await;
            if !outcome.ok {
                let code = outcome.code.unwrap_or("call.unknown");
                crate::observability::call_rejected(id, code, &outcome.message);
            }
            outcome
        })
    }

    fn dispatch<'a>(
        self: &'a Arc<Self>,
        id: &'a str,
        payload: Option<Payload>,
        depth: usize,
    ) -> BoxFuture<'a, CallOutcome> {
        Box::pin(async move {
            if self.is_shutdown() {
                return CallOutcome::err(CallError::Shutdown);
            }
            if depth > self.chain_depth_limit {
                return CallOutcome::err(CallError::ChainDepthExceeded { limit: self.chain_depth_limit });
            }

            let Some(channel) = self.store.get(id) else {
                return CallOutcome::err(CallError::NotFound);
            };
            if channel.blocked {
                return CallOutcome::err(CallError::Blocked);
            }
            let Some(handler) = self.subscribers.get(id) else {
                return CallOutcome::err(CallError::NoHandler);
            };

            if self.breathing.is_recuperating() && channel.config.priority != Priority::Critical {
                return CallOutcome::err(CallError::ShedForStress);
            }

            self.breathing.record_call();

            match channel.mode {
                Mode::FastPath => self.run_handler(&channel, &handler, payload.unwrap_or(Payload::Null), depth).await,
                Mode::Simple => self.run_simple(&channel, &handler, payload, depth).await,
                Mode::Full => self.run_full(&channel, &handler, payload, depth, 0).await,
            }
        })
    }

    async fn run_simple(
        self: &Arc<Self>,
        channel: &Arc<CompiledChannel>,
        handler: &Arc<dyn crate::handler::Handler>,
        payload: Option<Payload>,
        depth: usize,
    ) -> CallOutcome {
        let payload = match self.check_required(&channel.config, payload) {
            Ok(p) => p,
            Err(e) => return CallOutcome::err(e),
        };
        if let Some(schema) = &channel.config.schema {
            if let Err(errors) = schema(&payload) {
                return CallOutcome::err(CallError::SchemaInvalid(errors));
            }
        }
        self.run_handler(channel, handler, payload, depth).await
    }

    /// Runs the full canonical pipeline starting at `stages[start_idx..]`.
    /// `start_idx` lets a TimeKeeper re-entry (past debounce, or a
    /// scheduled fire) resume the walk without re-running earlier stages.
    fn run_full<'a>(
        self: &'a Arc<Self>,
        channel: &'a Arc<CompiledChannel>,
        handler: &'a Arc<dyn crate::handler::Handler>,
        payload: Option<Payload>,
        depth: usize,
        start_idx: usize,
    ) -> BoxFuture<'a, CallOutcome> {
        Box::pin(async move {
            let mut payload = payload.unwrap_or(Payload::Null);
            let now = self.clock.now_ms();

            for stage in &channel.stages[start_idx..] {
                match stage {
                    StageKind::Required => {
                        match self.check_required(&channel.config, Some(payload.clone())) {
                            Ok(p) => payload = p,
                            Err(e) => return CallOutcome::err(e),
                        }
                    }
                    StageKind::Schema => {
                        if let Some(schema) = &channel.config.schema {
                            if let Err(errors) = schema(&payload) {
                                return CallOutcome::err(CallError::SchemaInvalid(errors));
                            }
                        }
                    }
                    StageKind::Selector => {
                        if let Some(selector) = &channel.config.selector {
                            payload = selector(&payload);
                        }
                    }
                    StageKind::Condition => {
                        if let Some(condition) = &channel.config.condition {
                            if !condition(&payload) {
                                return CallOutcome::err(CallError::ConditionNotMet);
                            }
                        }
                    }
                    StageKind::Transform => {
                        if let Some(transform) = &channel.config.transform {
                            payload = transform(&payload);
                        }
                    }
                    StageKind::DetectChanges => {
                        if let Some(cached) = self.cache.get(channel.id()) {
                            if deep_equal(&cached.current, &payload) {
                                return CallOutcome::err(CallError::NoChanges);
                            }
                        }
                    }
                    StageKind::Throttle => {
                        if let Some(outcome) = self.check_throttle(channel, now).await {
                            return outcome;
                        }
                    }
                    StageKind::Debounce => {
                        return self.apply_debounce(channel, payload, now).await;
                    }
                    StageKind::Schedule => {
                        return self.apply_schedule(channel, payload).await;
                    }
                }
            }

            self.run_handler(channel, handler, payload, depth).await
        })
    }

    fn check_required(&self, config: &ChannelConfig, payload: Option<Payload>) -> Result<Payload, CallError> {
        let Some(required) = config.required else {
            return Ok(payload.unwrap_or(Payload::Null));
        };
        let Some(payload) = payload else {
            return Err(CallError::Required);
        };
        if payload.is_null() {
            return Err(CallError::Required);
        }
        if required == crate::channel::Required::NonEmpty {
            let empty = match &payload {
                Payload::String(s) => s.is_empty(),
                Payload::Array(a) => a.is_empty(),
                Payload::Object(o) => o.is_empty(),
                _ => false,
            };
            if empty {
                return Err(CallError::Required);
            }
        }
        Ok(payload)
    }

    async fn check_throttle(&self, channel: &Arc<CompiledChannel>, now_ms: u64) -> Option<CallOutcome> {
        let Some(throttle_ms) = channel.config.throttle_ms else { return None };
        if throttle_ms == 0 {
            return None;
        }
        let mut state = channel.state.lock().await;
        if let Some(last) = state.last_invoke_time_ms {
            let elapsed = now_ms.saturating_sub(last);
            if elapsed < throttle_ms {
                return Some(CallOutcome::err(CallError::Throttled { retry_in_ms: throttle_ms - elapsed }));
            }
        }
        state.last_invoke_time_ms = Some(now_ms);
        None
    }

    async fn apply_debounce(
        self: &Arc<Self>,
        channel: &Arc<CompiledChannel>,
        payload: Payload,
        now_ms: u64,
    ) -> CallOutcome {
        let debounce_ms = channel.config.debounce_ms.unwrap_or(0);
        let max_wait_ms = channel.config.max_wait_ms;

        let mut fire_immediately = false;
        {
            let mut state = channel.state.lock().await;
            let first_call_time_ms = state
                .pending_debounce
                .as_ref()
                .map(|d| d.first_call_time_ms)
                .unwrap_or(now_ms);

            if let Some(max_wait) = max_wait_ms {
                if now_ms.saturating_sub(first_call_time_ms) >= max_wait {
                    fire_immediately = true;
                }
            }

            if let Some(pending) = state.pending_debounce.take() {
                self.timekeeper.cancel(pending.timer_id);
            }

            if fire_immediately {
                state.pending_debounce = None;
            } else {
                let channel_for_timer = channel.clone();
                let this = self.clone();
                let payload_for_timer = payload.clone();
                let timer = self.timekeeper.schedule(ScheduleSpec {
                    label: channel.id().to_string(),
                    delay_ms: debounce_ms,
                    interval_ms: None,
                    repeat: RepeatSpec::Once,
                    callback: Arc::new(move || {
                        let this = this.clone();
                        let channel = channel_for_timer.clone();
                        let payload = payload_for_timer.clone();
                        Box::pin(async move {
                            this.flush_debounce(channel, payload).await;
                        })
                    }),
                });
                state.pending_debounce = Some(crate::channel::DebounceState {
                    buffered_payload: payload.clone(),
                    first_call_time_ms,
                    timer_id: timer.id,
                });
            }
        }

        if fire_immediately {
            let stage_idx = channel
                .stages
                .iter()
                .position(|s| matches!(s, StageKind::Debounce))
                .map(|i| i + 1)
                .unwrap_or(channel.stages.len());
            let handler = self.subscribers.get(channel.id());
            if let Some(handler) = handler {
                return self.run_full(channel, &handler, Some(payload), 0, stage_idx).await;
            }
            return CallOutcome::err(CallError::NoHandler);
        }

        CallOutcome::ok(None, "debounced")
    }

    async fn flush_debounce(self: Arc<Self>, channel: Arc<CompiledChannel>, payload: Payload) {
        {
            let mut state = channel.state.lock().await;
            state.pending_debounce = None;
        }
        let Some(handler) = self.subscribers.get(channel.id()) else { return };
        let stage_idx = channel
            .stages
            .iter()
            .position(|s| matches!(s, StageKind::Debounce))
            .map(|i| i + 1)
            .unwrap_or(channel.stages.len());
        self.resume_full(&channel, &handler, payload, stage_idx).await;
    }

    /// Re-enters the pipeline for a TimeKeeper-driven fire (a flushed
    /// debounce window or a scheduled/repeating timer), past the stage that
    /// scheduled it. Applies the same shutdown and recuperation guards a
    /// fresh `dispatch()` call applies, so a repeating channel's fires stay
    /// subject to stress-shedding instead of bypassing it by calling
    /// `run_full` directly.
    async fn resume_full(
        self: &Arc<Self>,
        channel: &Arc<CompiledChannel>,
        handler: &Arc<dyn crate::handler::Handler>,
        payload: Payload,
        start_idx: usize,
    ) {
        if self.is_shutdown() || channel.blocked {
            return;
        }
        if self.breathing.is_recuperating() && channel.config.priority != Priority::Critical {
            crate::observability::call_rejected(
                channel.id(),
                crate::error::codes::CALL_SHED_FOR_STRESS,
                "scheduled fire shed for stress",
            );
            return;
        }
        self.breathing.record_call();
        let _ = self.run_full(channel, handler, Some(payload), 0, start_idx).await;
    }

    async fn apply_schedule(self: &Arc<Self>, channel: &Arc<CompiledChannel>, payload: Payload) -> CallOutcome {
        let delay_ms = channel.config.delay_ms.unwrap_or_else(|| channel.config.interval_ms.unwrap_or(0));
        let interval_ms = channel.config.interval_ms;
        let repeat = match channel.config.repeat {
            Some(crate::channel::Repeat::Infinite) => RepeatSpec::Infinite,
            Some(crate::channel::Repeat::Count(n)) => RepeatSpec::Count(n),
            None => RepeatSpec::Once,
        };

        let stage_idx = channel
            .stages
            .iter()
            .position(|s| matches!(s, StageKind::Schedule))
            .map(|i| i + 1)
            .unwrap_or(channel.stages.len());

        let this = self.clone();
        let channel_for_timer = channel.clone();
        let payload_for_timer = payload.clone();
        self.timekeeper.schedule(ScheduleSpec {
            label: channel.id().to_string(),
            delay_ms,
            interval_ms,
            repeat,
            callback: Arc::new(move || {
                let this = this.clone();
                let channel = channel_for_timer.clone();
                let payload = payload_for_timer.clone();
                Box::pin(async move {
                    let Some(handler) = this.subscribers.get(channel.id()) else { return };
                    this.resume_full(&channel, &handler, payload, stage_idx).await;
                })
            }),
        });

        CallOutcome::ok(None, "scheduled")
    }

    fn run_handler<'a>(
        self: &'a Arc<Self>,
        channel: &'a Arc<CompiledChannel>,
        handler: &'a Arc<dyn crate::handler::Handler>,
        payload: Payload,
        depth: usize,
    ) -> BoxFuture<'a, CallOutcome> {
        Box::pin(async move {
            let start_ms = self.clock.now_ms();
            let result = handler.call(payload).await;
            let elapsed = self.clock.now_ms().saturating_sub(start_ms);
            self.breathing.record_latency(elapsed);

            {
                let mut state = channel.state.lock().await;
                state.execution_count += 1;
                state.last_execution_time_ms = Some(self.clock.now_ms());
                if result.is_err() {
                    state.error_count += 1;
                }
            }

            match result {
                Ok(HandlerReturn::Value(value)) => {
                    self.cache.record(channel.id(), value.clone(), self.clock.now_ms());
                    crate::observability::handler_succeeded(channel.id(), elapsed);
                    CallOutcome::ok(Some(value), "ok")
                }
                Ok(HandlerReturn::Chain { id: next_id, payload: next_payload }) => {
                    self.cache.record(channel.id(), Payload::Null, self.clock.now_ms());
                    crate::observability::handler_succeeded(channel.id(), elapsed);
                    self.dispatch(&next_id, Some(next_payload), depth + 1).await
                }
                Err(message) => {
                    self.breathing.record_error();
                    crate::observability::handler_failed(channel.id(), &message);
                    CallOutcome::err(CallError::HandlerError(message))
                }
            }
        })
    }
}
