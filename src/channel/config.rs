//! The public, pre-compile channel configuration.

use std::fmt;
use std::sync::Arc;

use crate::payload::Payload;

/// Dispatch priority. `Critical` is the only priority that bypasses the
/// breathing controller's recuperation gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
    Background,
}

/// `required: bool | "non-empty"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Required {
    /// Payload must not be `null`/absent.
    Any,
    /// Payload must not be `null`/absent, and if it is a string, array, or
    /// object, must also be non-empty.
    NonEmpty,
}

/// `repeat: uint | infinite`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    Count(u64),
    Infinite,
}

impl Repeat {
    pub fn is_zero(self) -> bool {
        matches!(self, Repeat::Count(0))
    }
}

pub type SchemaFn = Arc<dyn Fn(&Payload) -> Result<(), Vec<String>> + Send + Sync>;
pub type ConditionFn = Arc<dyn Fn(&Payload) -> bool + Send + Sync>;
pub type SelectorFn = Arc<dyn Fn(&Payload) -> Payload + Send + Sync>;
pub type TransformFn = Arc<dyn Fn(&Payload) -> Payload + Send + Sync>;

/// A channel's configuration as supplied by the caller of `action(...)`,
/// before compilation. Every field is optional except `id`; the compiler
/// (see [`crate::channel::compiler`]) decides what combination is valid.
#[derive(Clone, Default)]
pub struct ChannelConfig {
    pub id: String,
    pub initial_payload: Option<Payload>,
    pub priority: Priority,

    // Protections.
    pub block: bool,
    pub throttle_ms: Option<u64>,
    pub debounce_ms: Option<u64>,
    pub max_wait_ms: Option<u64>,
    pub detect_changes: bool,
    pub required: Option<Required>,

    // Transformation.
    pub schema: Option<SchemaFn>,
    pub condition: Option<ConditionFn>,
    pub selector: Option<SelectorFn>,
    pub transform: Option<TransformFn>,

    // Scheduling.
    pub delay_ms: Option<u64>,
    pub interval_ms: Option<u64>,
    pub repeat: Option<Repeat>,
}

impl ChannelConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), ..Default::default() }
    }

    pub fn throttle(mut self, ms: u64) -> Self {
        self.throttle_ms = Some(ms);
        self
    }

    pub fn debounce(mut self, ms: u64) -> Self {
        self.debounce_ms = Some(ms);
        self
    }

    pub fn max_wait(mut self, ms: u64) -> Self {
        self.max_wait_ms = Some(ms);
        self
    }

    pub fn detect_changes(mut self) -> Self {
        self.detect_changes = true;
        self
    }

    pub fn required(mut self, mode: Required) -> Self {
        self.required = Some(mode);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn delay(mut self, ms: u64) -> Self {
        self.delay_ms = Some(ms);
        self
    }

    pub fn interval(mut self, ms: u64) -> Self {
        self.interval_ms = Some(ms);
        self
    }

    pub fn repeat(mut self, repeat: Repeat) -> Self {
        self.repeat = Some(repeat);
        self
    }

    pub fn schema<F>(mut self, f: F) -> Self
    where
        F: Fn(&Payload) -> Result<(), Vec<String>> + Send + Sync + 'static,
    {
        self.schema = Some(Arc::new(f));
        self
    }

    pub fn condition<F>(mut self, f: F) -> Self
    where
        F: Fn(&Payload) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(f));
        self
    }

    pub fn selector<F>(mut self, f: F) -> Self
    where
        F: Fn(&Payload) -> Payload + Send + Sync + 'static,
    {
        self.selector = Some(Arc::new(f));
        self
    }

    pub fn transform<F>(mut self, f: F) -> Self
    where
        F: Fn(&Payload) -> Payload + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(f));
        self
    }

    pub fn block(mut self) -> Self {
        self.block = true;
        self
    }

    /// A stable hash used to memoise compilation: two configs that hash
    /// equally are treated as identical for the purpose of `action()`
    /// re-registration, without requiring `ChannelConfig` to implement
    /// `Eq` over its function-pointer fields.
    pub fn stable_fingerprint(&self) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.id.hash(&mut hasher);
        self.priority.hash(&mut hasher);
        self.block.hash(&mut hasher);
        self.throttle_ms.hash(&mut hasher);
        self.debounce_ms.hash(&mut hasher);
        self.max_wait_ms.hash(&mut hasher);
        self.detect_changes.hash(&mut hasher);
        self.required.map(|r| r == Required::NonEmpty).hash(&mut hasher);
        self.delay_ms.hash(&mut hasher);
        self.interval_ms.hash(&mut hasher);
        self.repeat.hash(&mut hasher);
        // Closures participate in the fingerprint only through their
        // presence, not their behaviour: we cannot compare function bodies,
        // so replacing a closure with a behaviourally different one under
        // the same `id` always recompiles (pointer identity is ignored).
        self.schema.is_some().hash(&mut hasher);
        self.condition.is_some().hash(&mut hasher);
        self.selector.is_some().hash(&mut hasher);
        self.transform.is_some().hash(&mut hasher);
        hasher.finish()
    }
}

impl std::hash::Hash for Repeat {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            Repeat::Count(n) => (0u8, n).hash(state),
            Repeat::Infinite => 1u8.hash(state),
        }
    }
}

impl fmt::Debug for ChannelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelConfig")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("block", &self.block)
            .field("throttle_ms", &self.throttle_ms)
            .field("debounce_ms", &self.debounce_ms)
            .field("max_wait_ms", &self.max_wait_ms)
            .field("detect_changes", &self.detect_changes)
            .field("required", &self.required)
            .field("delay_ms", &self.delay_ms)
            .field("interval_ms", &self.interval_ms)
            .field("repeat", &self.repeat)
            .field("has_schema", &self.schema.is_some())
            .field("has_condition", &self.condition.is_some())
            .field("has_selector", &self.selector.is_some())
            .field("has_transform", &self.transform.is_some())
            .finish()
    }
}
