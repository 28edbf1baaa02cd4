//! `Runtime`: the external-facing surface, owning every shared store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::branch::{Branch, BranchRegistry};
use crate::breathing::{Breathing, BreathingSnapshot};
use crate::channel::{ChannelConfig, CompileReport, CompiledChannel};
use crate::clock::{Clock, SystemClock};
use crate::dispatch::{CallOutcome, Dispatcher, DEFAULT_CHAIN_DEPTH_LIMIT};
use crate::error::CompileError;
use crate::group::Group;
use crate::handler::Handler;
use crate::payload::Payload;
use crate::store::{ChannelStore, PayloadCache, SubscriberStore};
use crate::timekeeper::TimeKeeper;

/// Runtime-wide (as opposed to per-channel) configuration: how often the
/// breathing controller samples, the default chain-depth bound, and the
/// assumed peak call rate/target latency its stress formula is calibrated
/// against.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub breathing_sample_period: Duration,
    pub breathing_peak_call_rate: f64,
    pub breathing_target_latency_ms: f64,
    pub chain_depth_limit: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            breathing_sample_period: Duration::from_secs(1),
            breathing_peak_call_rate: 100.0,
            breathing_target_latency_ms: 50.0,
            chain_depth_limit: DEFAULT_CHAIN_DEPTH_LIMIT,
        }
    }
}

pub struct RuntimeOptionsBuilder {
    options: RuntimeOptions,
}

impl RuntimeOptionsBuilder {
    pub fn new() -> Self {
        Self { options: RuntimeOptions::default() }
    }

    pub fn breathing_sample_period(mut self, period: Duration) -> Self {
        self.options.breathing_sample_period = period;
        self
    }

    pub fn breathing_peak_call_rate(mut self, rate: f64) -> Self {
        self.options.breathing_peak_call_rate = rate;
        self
    }

    pub fn chain_depth_limit(mut self, limit: usize) -> Self {
        self.options.chain_depth_limit = limit;
        self
    }

    pub fn build(self) -> RuntimeOptions {
        self.options
    }
}

impl Default for RuntimeOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The in-process reactive channel runtime.
///
/// Construct with [`Runtime::new`] or [`Runtime::with_options`], then call
/// [`Runtime::init`] before issuing any `call`. Dropping the last clone does
/// not tear anything down explicitly; call [`Runtime::shutdown`] first if an
/// orderly stop (draining in-flight handlers, rejecting new calls) matters.
#[derive(Clone)]
pub struct Runtime {
    dispatcher: Arc<Dispatcher>,
    breathing: Arc<Breathing>,
    root: Branch,
    locked: Arc<AtomicBool>,
    options: RuntimeOptions,
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_options(RuntimeOptions::default())
    }

    pub fn with_options(options: RuntimeOptions) -> Self {
        Self::with_clock(options, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(options: RuntimeOptions, clock: Arc<dyn Clock>) -> Self {
        let breathing = Breathing::new(
            options.breathing_peak_call_rate,
            options.breathing_target_latency_ms,
            options.breathing_sample_period,
        );
        let timekeeper = Arc::new(TimeKeeper::spawn(clock.clone(), breathing.clone()));
        let dispatcher = Arc::new(Dispatcher {
            store: Arc::new(ChannelStore::new()),
            subscribers: Arc::new(SubscriberStore::new()),
            cache: Arc::new(PayloadCache::new()),
            timekeeper,
            breathing: breathing.clone(),
            clock,
            chain_depth_limit: options.chain_depth_limit,
            shutdown: AtomicBool::new(false),
        });
        let branch_registry = Arc::new(BranchRegistry::new());
        let root = Branch::new_root(branch_registry, dispatcher.clone());

        Self { dispatcher, breathing, root, locked: Arc::new(AtomicBool::new(false)), options }
    }

    /// Idempotent. Starts the periodic breathing sampler. TimeKeeper starts
    /// eagerly at construction, so `init` only needs to bring breathing
    /// online; calling it more than once is harmless.
    pub fn init(&self) {
        let breathing = self.breathing.clone();
        let period = self.options.breathing_sample_period;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                breathing.sample();
                crate::observability::breathing_transitioned(breathing.snapshot());
            }
        });
    }

    pub fn root(&self) -> &Branch {
        &self.root
    }

    pub fn action(&self, config: ChannelConfig) -> Result<CompileReport, CompileError> {
        if self.locked.load(Ordering::Acquire) {
            return Err(CompileError::blocking(crate::error::CompileIssue::new(
                "id",
                "runtime is locked: no new channels may be created",
            )));
        }
        let report = self.root.action(config)?;
        crate::observability::channel_compiled(
            report.channel.id(),
            report.channel.mode,
            report.warnings.len(),
        );
        Ok(report)
    }

    pub fn on(&self, id: impl AsRef<str>, handler: Arc<dyn Handler>) {
        self.root.on(id, handler);
    }

    pub async fn call(&self, id: &str, payload: Option<Payload>) -> CallOutcome {
        self.dispatcher.call(id, payload).await
    }

    pub fn get(&self, id: &str) -> Option<Arc<CompiledChannel>> {
        self.dispatcher.store.get(id)
    }

    pub fn forget(&self, id: &str) -> bool {
        if self.locked.load(Ordering::Acquire) {
            return false;
        }
        self.root.forget(id)
    }

    pub fn clear(&self) {
        self.dispatcher.store.clear();
        self.dispatcher.subscribers.clear();
        self.dispatcher.cache.clear();
    }

    pub fn pause(&self, id: Option<u64>) {
        match id {
            Some(id) => self.dispatcher.timekeeper.pause(id),
            None => self.dispatcher.timekeeper.pause_all(),
        }
    }

    pub fn resume(&self, id: Option<u64>) {
        match id {
            Some(id) => self.dispatcher.timekeeper.resume(id),
            None => self.dispatcher.timekeeper.resume_all(),
        }
    }

    pub fn lock(&self) {
        self.locked.store(true, Ordering::Release);
    }

    pub fn shutdown(&self) {
        self.dispatcher.set_shutdown();
        self.dispatcher.timekeeper.shutdown();
    }

    pub fn create_branch(&self, id: &str) -> Result<Branch, crate::error::BranchError> {
        self.root.create_child(id, None)
    }

    pub fn group(&self, id: impl Into<String>) -> Group {
        Group::new(id, self.dispatcher.clone())
    }

    pub fn breathing_snapshot(&self) -> BreathingSnapshot {
        self.breathing.snapshot()
    }

    /// Recalibrates the breathing controller's stress formula in place,
    /// without a restart or a lock on the call path. Useful after
    /// provisioning changes the realistic peak call rate or latency target.
    pub fn recalibrate_breathing(&self, peak_call_rate: f64, target_latency_ms: f64) {
        self.breathing.recalibrate(peak_call_rate, target_latency_ms);
    }

    pub fn channel_count(&self) -> usize {
        self.dispatcher.store.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.dispatcher.subscribers.count()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
