//! The compiled, immutable channel record plus its mutable dispatch state.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::channel::config::ChannelConfig;
use crate::payload::Payload;

/// Execution mode chosen by the compiler. See
/// [`crate::channel::compiler::compile`] for the selection rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// No operators at all: dispatch invokes the handler directly.
    FastPath,
    /// Only `required`/`schema` are set: a two-stage walker runs.
    Simple,
    /// Anything else: the full canonical pipeline runs.
    Full,
}

/// One stage of the canonical pipeline, in the fixed execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Required,
    Schema,
    Selector,
    Condition,
    Transform,
    DetectChanges,
    Throttle,
    Debounce,
    Schedule,
}

/// Bookkeeping for a single in-flight or just-completed debounce window.
#[derive(Debug, Clone)]
pub struct DebounceState {
    pub buffered_payload: Payload,
    pub first_call_time_ms: u64,
    /// Identifies the TimeKeeper timer currently scheduled to flush this
    /// debounce window, so a new call can cancel and replace it.
    pub timer_id: u64,
}

/// Mutable, per-channel dispatch state. Guarded by a single mutex so that,
/// per channel, one call's full pipeline commits or rejects before the next
/// call's pipeline is inspected — the serialisation guarantee the dispatch
/// engine relies on.
#[derive(Debug, Default)]
pub struct TransientState {
    pub last_execution_time_ms: Option<u64>,
    pub last_invoke_time_ms: Option<u64>,
    pub pending_debounce: Option<DebounceState>,
    pub execution_count: u64,
    pub error_count: u64,
}

/// A channel after successful compilation: the immutable configuration plus
/// the derived `mode`/`stages`, and the mutable per-call state behind a lock.
///
/// Replacing a channel (re-`action()` with the same id) swaps the whole
/// `Arc<CompiledChannel>` in the store; it never mutates one in place, so
/// any `Arc` a handler or timer callback is still holding observes a
/// consistent, frozen snapshot of the configuration it was invoked under.
pub struct CompiledChannel {
    pub config: Arc<ChannelConfig>,
    pub mode: Mode,
    pub stages: Vec<StageKind>,
    pub blocked: bool,
    pub state: Mutex<TransientState>,
}

impl CompiledChannel {
    pub fn id(&self) -> &str {
        &self.config.id
    }
}

impl std::fmt::Debug for CompiledChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledChannel")
            .field("id", &self.config.id)
            .field("mode", &self.mode)
            .field("stages", &self.stages)
            .field("blocked", &self.blocked)
            .finish()
    }
}
