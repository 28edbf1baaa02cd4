//! Thin, tracing-backed event facade.
//!
//! The runtime does not store event history beyond the payload cache and
//! the small per-channel counters already in [`crate::channel::TransientState`];
//! anything richer (dashboards, alerting, long-lived metrics) is a
//! collaborator listening to the `tracing` spans/events emitted here. This
//! module exists to name the emission points in one place rather than
//! scattering ad hoc `tracing::` calls with inconsistent fields.

use tracing::{event, Level};

use crate::breathing::BreathingSnapshot;
use crate::channel::Mode;

pub fn channel_compiled(id: &str, mode: Mode, warning_count: usize) {
    event!(Level::DEBUG, channel = id, ?mode, warning_count, "channel compiled");
}

pub fn call_entered(id: &str) {
    event!(Level::TRACE, channel = id, "call entered");
}

pub fn call_rejected(id: &str, code: &'static str, message: &str) {
    event!(Level::DEBUG, channel = id, code, message, "call rejected");
}

pub fn handler_succeeded(id: &str, elapsed_ms: u64) {
    event!(Level::TRACE, channel = id, elapsed_ms, "handler succeeded");
}

pub fn handler_failed(id: &str, error: &str) {
    event!(Level::WARN, channel = id, error, "handler failed");
}

pub fn timer_fired(label: &str, chunked: bool, now_ms: u64) {
    event!(Level::TRACE, label, chunked, now_ms, "timer fired");
}

pub fn breathing_transitioned(snapshot: BreathingSnapshot) {
    event!(
        Level::INFO,
        stress = snapshot.stress,
        pattern = ?snapshot.pattern,
        current_rate = snapshot.current_rate,
        is_recuperating = snapshot.is_recuperating,
        "breathing state sampled"
    );
}
