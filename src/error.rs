//! Stable, machine-readable error taxonomy for every fallible surface of the runtime.
//!
//! Mirrors the split the runtime uses everywhere else: a small `enum` carries the
//! *kind* of failure, a `codes` module exposes the matching `&'static str` so
//! operators can grep a stable string across log lines regardless of how the
//! `Display` message is phrased on any given release.

use std::fmt;
use std::sync::Arc;

use crate::channel::compiled::CompiledChannel;
use crate::payload::Payload;

/// Stable string codes, one per [`CyreError`] variant family.
///
/// These never change meaning once shipped; renaming a variant does not
/// retire its code unless the behaviour it names is also retired.
pub mod codes {
    pub const COMPILE_MISSING_ID: &str = "compile.missing_id";
    pub const COMPILE_INVALID_FIELD: &str = "compile.invalid_field";
    pub const COMPILE_CROSS_FIELD_CONFLICT: &str = "compile.cross_field_conflict";
    pub const COMPILE_BLOCKING: &str = "compile.blocking";

    pub const CALL_NOT_FOUND: &str = "call.not_found";
    pub const CALL_NO_HANDLER: &str = "call.no_handler";
    pub const CALL_BLOCKED: &str = "call.blocked";
    pub const CALL_SHED_FOR_STRESS: &str = "call.shed_for_stress";
    pub const CALL_THROTTLED: &str = "call.throttled";
    pub const CALL_CONDITION_NOT_MET: &str = "call.condition_not_met";
    pub const CALL_NO_CHANGES: &str = "call.no_changes";
    pub const CALL_REQUIRED: &str = "call.required";
    pub const CALL_SCHEMA_INVALID: &str = "call.schema_invalid";
    pub const CALL_HANDLER_ERROR: &str = "call.handler_error";
    pub const CALL_CHAIN_DEPTH_EXCEEDED: &str = "call.chain_depth_exceeded";
    pub const CALL_SHUTDOWN: &str = "call.shutdown";

    pub const BRANCH_CROSS_BRANCH_DENIED: &str = "branch.cross_branch_denied";
    pub const BRANCH_INVALID_ID: &str = "branch.invalid_id";
    pub const BRANCH_MAX_DEPTH_EXCEEDED: &str = "branch.max_depth_exceeded";

    pub const GROUP_TIMEOUT: &str = "group.timeout";
    pub const GROUP_ALL_FAILED: &str = "group.all_failed";
}

/// A single validation or cross-field failure produced while compiling a channel.
#[derive(Debug, Clone)]
pub struct CompileIssue {
    pub field: &'static str,
    pub message: String,
    pub suggestions: Vec<String>,
}

impl CompileIssue {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self { field, message: message.into(), suggestions: Vec::new() }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }
}

impl fmt::Display for CompileIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Top level error type returned from channel compilation.
///
/// A blocking rejection still names the channel that failed to compile: a
/// caller that wants `call(id)` to resolve to a stable `Blocked` outcome
/// rather than `NotFound` can pull `blocked_channel` out of the error and
/// record it, the same way `config.block == true` already does.
#[derive(Debug, Clone, thiserror::Error)]
#[error("channel compilation failed: {}", issues.iter().map(|i| i.to_string()).collect::<Vec<_>>().join("; "))]
pub struct CompileError {
    pub code: &'static str,
    pub issues: Vec<CompileIssue>,
    pub blocked_channel: Option<Arc<CompiledChannel>>,
}

impl CompileError {
    pub fn blocking(issue: CompileIssue) -> Self {
        Self { code: codes::COMPILE_BLOCKING, issues: vec![issue], blocked_channel: None }
    }

    pub fn missing_id() -> Self {
        Self {
            code: codes::COMPILE_MISSING_ID,
            issues: vec![CompileIssue::new("id", "channel id must be a non-empty string")
                .with_suggestion("pass a stable, url-safe identifier such as \"orders/create\"")],
            blocked_channel: None,
        }
    }

    pub fn invalid_field(issue: CompileIssue) -> Self {
        Self { code: codes::COMPILE_INVALID_FIELD, issues: vec![issue], blocked_channel: None }
    }

    pub fn cross_field_conflict(issue: CompileIssue) -> Self {
        Self { code: codes::COMPILE_CROSS_FIELD_CONFLICT, issues: vec![issue], blocked_channel: None }
    }

    /// Attaches the blocked channel a caller should still register in the
    /// store, so a later `call(id)` resolves to `Blocked` rather than
    /// `NotFound`.
    pub fn with_blocked_channel(mut self, channel: Arc<CompiledChannel>) -> Self {
        self.blocked_channel = Some(channel);
        self
    }
}

/// The outcome of a `call`. Every rejection is a *value*, never a panic or a
/// thrown exception: protection rejections (throttle, debounce, no-changes,
/// condition-not-met) are reported the same way as lookup failures, just with
/// a different `CallOutcome`, so callers can match without a `try/catch`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CallError {
    #[error("channel not found")]
    NotFound,
    #[error("channel has no registered handler")]
    NoHandler,
    #[error("channel is permanently blocked")]
    Blocked,
    #[error("call shed under stress (priority below critical)")]
    ShedForStress,
    #[error("throttled, retry in {retry_in_ms}ms")]
    Throttled { retry_in_ms: u64 },
    #[error("condition not met")]
    ConditionNotMet,
    #[error("no changes detected")]
    NoChanges,
    #[error("payload required but missing or empty")]
    Required,
    #[error("schema validation failed: {0:?}")]
    SchemaInvalid(Vec<String>),
    #[error("handler error: {0}")]
    HandlerError(String),
    #[error("chain depth exceeded (limit {limit})")]
    ChainDepthExceeded { limit: usize },
    #[error("runtime is shut down")]
    Shutdown,
    #[error("cross-branch call denied: {caller} -> {target}")]
    CrossBranchDenied { caller: String, target: String },
}

impl CallError {
    pub fn code(&self) -> &'static str {
        match self {
            CallError::NotFound => codes::CALL_NOT_FOUND,
            CallError::NoHandler => codes::CALL_NO_HANDLER,
            CallError::Blocked => codes::CALL_BLOCKED,
            CallError::ShedForStress => codes::CALL_SHED_FOR_STRESS,
            CallError::Throttled { .. } => codes::CALL_THROTTLED,
            CallError::ConditionNotMet => codes::CALL_CONDITION_NOT_MET,
            CallError::NoChanges => codes::CALL_NO_CHANGES,
            CallError::Required => codes::CALL_REQUIRED,
            CallError::SchemaInvalid(_) => codes::CALL_SCHEMA_INVALID,
            CallError::HandlerError(_) => codes::CALL_HANDLER_ERROR,
            CallError::ChainDepthExceeded { .. } => codes::CALL_CHAIN_DEPTH_EXCEEDED,
            CallError::Shutdown => codes::CALL_SHUTDOWN,
            CallError::CrossBranchDenied { .. } => codes::BRANCH_CROSS_BRANCH_DENIED,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum BranchError {
    #[error("branch id must not contain '/': {0}")]
    InvalidId(String),
    #[error("branch depth exceeds the configured maximum of {max_depth}")]
    MaxDepthExceeded { max_depth: usize },
}

impl BranchError {
    pub fn code(&self) -> &'static str {
        match self {
            BranchError::InvalidId(_) => codes::BRANCH_INVALID_ID,
            BranchError::MaxDepthExceeded { .. } => codes::BRANCH_MAX_DEPTH_EXCEEDED,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum GroupError {
    #[error("group call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64, partial: Vec<(String, bool)> },
    #[error("all group members failed")]
    AllFailed { partial: Vec<(String, bool)> },
}

impl GroupError {
    pub fn code(&self) -> &'static str {
        match self {
            GroupError::Timeout { .. } => codes::GROUP_TIMEOUT,
            GroupError::AllFailed { .. } => codes::GROUP_ALL_FAILED,
        }
    }
}

/// The umbrella error, used where a caller needs to handle any of the above
/// uniformly (for example the `runtime` facade's top level `Result`).
#[derive(Debug, Clone, thiserror::Error)]
pub enum CyreError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Call(#[from] CallError),
    #[error(transparent)]
    Branch(#[from] BranchError),
    #[error(transparent)]
    Group(#[from] GroupError),
}

impl CyreError {
    pub fn code(&self) -> &'static str {
        match self {
            CyreError::Compile(e) => e.code,
            CyreError::Call(e) => e.code(),
            CyreError::Branch(e) => e.code(),
            CyreError::Group(e) => e.code(),
        }
    }
}

/// Structured metadata attached to a [`crate::dispatch::CallOutcome`], analogous
/// to the `retryInMs` / `errors` fields the spec calls for on specific rejections.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CallMetadata {
    pub retry_in_ms: Option<u64>,
    pub delay_ms: Option<u64>,
    pub schema_errors: Vec<String>,
    pub last_payload: Option<Payload>,
}
