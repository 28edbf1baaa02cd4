//! Per-field validation, cross-field rules, and mode selection.
//!
//! Mirrors the validate-then-classify shape of a layered configuration
//! builder: every field gets an independent check, then a small set of
//! cross-field rules run over the validated whole, and only then is an
//! execution mode chosen.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::channel::compiled::{CompiledChannel, Mode, StageKind, TransientState};
use crate::channel::config::ChannelConfig;
use crate::error::{CompileError, CompileIssue};

/// Warnings are non-blocking; the channel still compiles, but the caller
/// may want to act on them. Nothing in this crate currently escalates a
/// warning to a blocking error.
#[derive(Debug, Clone)]
pub struct CompileWarning {
    pub field: &'static str,
    pub message: String,
}

pub struct CompileReport {
    pub channel: Arc<CompiledChannel>,
    pub warnings: Vec<CompileWarning>,
}

/// Compiles a [`ChannelConfig`] into a [`CompiledChannel`], or returns the
/// blocking [`CompileError`] that prevents registration.
pub fn compile(config: ChannelConfig) -> Result<CompileReport, CompileError> {
    if config.id.trim().is_empty() {
        return Err(CompileError::missing_id());
    }

    let mut warnings = Vec::new();
    if let Err(err) = validate_fields(&config, &mut warnings) {
        return Err(err.with_blocked_channel(blocked_channel(config)));
    }
    if let Err(err) = check_cross_field_rules(&config) {
        return Err(err.with_blocked_channel(blocked_channel(config)));
    }

    if config.block {
        return Ok(CompileReport { channel: blocked_channel(config), warnings });
    }

    let mode = select_mode(&config);
    let stages = canonical_stages(&config);

    let config = Arc::new(config);
    let channel = CompiledChannel {
        config,
        mode,
        stages,
        blocked: false,
        state: Mutex::new(TransientState::default()),
    };

    Ok(CompileReport { channel: Arc::new(channel), warnings })
}

/// Builds a `CompiledChannel` marked permanently blocked: no stages, no
/// mode selection, just enough of a record that the channel id resolves to
/// a stable `Blocked` call outcome instead of disappearing from the store.
/// Used both for an explicit `config.block == true` and for every blocking
/// compile rejection, so a rejected channel is still addressable.
fn blocked_channel(config: ChannelConfig) -> Arc<CompiledChannel> {
    Arc::new(CompiledChannel {
        config: Arc::new(config),
        mode: Mode::Full,
        stages: Vec::new(),
        blocked: true,
        state: Mutex::new(TransientState::default()),
    })
}

fn validate_fields(config: &ChannelConfig, warnings: &mut Vec<CompileWarning>) -> Result<(), CompileError> {
    if let Some(repeat) = config.repeat {
        if repeat.is_zero() {
            return Err(CompileError::blocking(
                CompileIssue::new("repeat", "repeat: 0 can never fire and is rejected at compile time")
                    .with_suggestion("omit `repeat`, or use repeat: 1 to fire exactly once"),
            ));
        }
    }

    if let Some(throttle) = config.throttle_ms {
        if throttle > 0 && throttle < 16 {
            warnings.push(CompileWarning {
                field: "throttle_ms",
                message: format!("throttle of {throttle}ms is below a single frame; consider >= 16ms"),
            });
        }
    }

    if let Some(debounce) = config.debounce_ms {
        if debounce > 0 && debounce < 100 {
            warnings.push(CompileWarning {
                field: "debounce_ms",
                message: format!("debounce of {debounce}ms is unusually short; consider >= 100ms"),
            });
        }
    }

    if let Some(interval) = config.interval_ms {
        if interval > 0 && interval < 1_000 {
            warnings.push(CompileWarning {
                field: "interval_ms",
                message: format!("interval of {interval}ms is sub-second; confirm this is intended"),
            });
        }
    }

    if config.schema.is_some() && config.required.is_none() {
        warnings.push(CompileWarning {
            field: "required",
            message: "schema present without an explicit `required`; treating payload as required".into(),
        });
    }

    Ok(())
}

fn check_cross_field_rules(config: &ChannelConfig) -> Result<(), CompileError> {
    if config.interval_ms.is_some() && config.repeat.is_none() {
        return Err(CompileError::cross_field_conflict(
            CompileIssue::new("interval", "interval requires repeat to be specified")
                .with_suggestion("add repeat: Repeat::Count(n), or Repeat::Infinite for an unbounded interval"),
        ));
    }

    if config.max_wait_ms.is_some() && config.debounce_ms.is_none() {
        return Err(CompileError::cross_field_conflict(
            CompileIssue::new("max_wait", "max_wait requires debounce to be specified")
                .with_suggestion("add a debounce_ms value, or remove max_wait"),
        ));
    }

    if config.throttle_ms.is_some() && config.debounce_ms.is_some() {
        return Err(CompileError::cross_field_conflict(
            CompileIssue::new("throttle", "throttle and debounce are mutually exclusive")
                .with_suggestion("pick exactly one of throttle or debounce for this channel"),
        ));
    }

    if let (Some(max_wait), Some(debounce)) = (config.max_wait_ms, config.debounce_ms) {
        if max_wait <= debounce {
            return Err(CompileError::cross_field_conflict(
                CompileIssue::new("max_wait", format!("max_wait ({max_wait}ms) must exceed debounce ({debounce}ms)"))
                    .with_suggestion("increase max_wait above debounce, or remove max_wait"),
            ));
        }
    }

    Ok(())
}

fn select_mode(config: &ChannelConfig) -> Mode {
    let has_protection = config.throttle_ms.is_some()
        || config.debounce_ms.is_some()
        || config.detect_changes
        || config.block;
    let has_processing =
        config.condition.is_some() || config.selector.is_some() || config.transform.is_some();
    let has_scheduling =
        config.delay_ms.is_some() || config.interval_ms.is_some() || config.repeat.is_some();
    let has_simple_only = config.required.is_some() || config.schema.is_some();

    if !has_protection && !has_processing && !has_scheduling && !has_simple_only {
        Mode::FastPath
    } else if !has_protection && !has_processing && !has_scheduling && has_simple_only {
        Mode::Simple
    } else {
        Mode::Full
    }
}

/// Builds the stage list in the one, fixed canonical order regardless of the
/// order fields were set on the config.
fn canonical_stages(config: &ChannelConfig) -> Vec<StageKind> {
    let mut stages = Vec::new();
    if config.required.is_some() {
        stages.push(StageKind::Required);
    }
    if config.schema.is_some() {
        stages.push(StageKind::Schema);
    }
    if config.selector.is_some() {
        stages.push(StageKind::Selector);
    }
    if config.condition.is_some() {
        stages.push(StageKind::Condition);
    }
    if config.transform.is_some() {
        stages.push(StageKind::Transform);
    }
    if config.detect_changes {
        stages.push(StageKind::DetectChanges);
    }
    if config.throttle_ms.is_some() {
        stages.push(StageKind::Throttle);
    }
    if config.debounce_ms.is_some() {
        stages.push(StageKind::Debounce);
    }
    if config.delay_ms.is_some() || config.interval_ms.is_some() {
        stages.push(StageKind::Schedule);
    }
    stages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::config::{ChannelConfig, Repeat};

    #[test]
    fn fast_path_for_bare_channel() {
        let report = compile(ChannelConfig::new("a")).unwrap();
        assert_eq!(report.channel.mode, Mode::FastPath);
        assert!(report.channel.stages.is_empty());
    }

    #[test]
    fn simple_mode_for_required_only() {
        let report = compile(ChannelConfig::new("a").required(crate::channel::config::Required::Any)).unwrap();
        assert_eq!(report.channel.mode, Mode::Simple);
    }

    #[test]
    fn interval_without_repeat_is_rejected() {
        let err = compile(ChannelConfig::new("a").interval(100)).unwrap_err();
        assert_eq!(err.code, crate::error::codes::COMPILE_CROSS_FIELD_CONFLICT);
    }

    #[test]
    fn throttle_and_debounce_conflict() {
        let err = compile(ChannelConfig::new("a").throttle(100).debounce(100)).unwrap_err();
        assert_eq!(err.code, crate::error::codes::COMPILE_CROSS_FIELD_CONFLICT);
    }

    #[test]
    fn max_wait_must_exceed_debounce() {
        let err = compile(ChannelConfig::new("a").debounce(500).max_wait(100)).unwrap_err();
        assert_eq!(err.code, crate::error::codes::COMPILE_CROSS_FIELD_CONFLICT);
    }

    #[test]
    fn repeat_zero_is_blocking() {
        let err = compile(ChannelConfig::new("a").repeat(Repeat::Count(0))).unwrap_err();
        assert_eq!(err.code, crate::error::codes::COMPILE_BLOCKING);
    }

    #[test]
    fn canonical_order_is_fixed_regardless_of_builder_order() {
        let report = compile(
            ChannelConfig::new("a")
                .debounce(200)
                .detect_changes()
                .condition(|_| true)
                .required(crate::channel::config::Required::Any),
        )
        .unwrap();
        assert_eq!(
            report.channel.stages,
            vec![
                StageKind::Required,
                StageKind::Condition,
                StageKind::DetectChanges,
                StageKind::Debounce,
            ]
        );
    }
}
