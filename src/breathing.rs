//! Adaptive load controller: turns recent call/error/latency counters into a
//! `stress` scalar, a timer-rate multiplier, and a recuperation gate.
//!
//! `Pattern`'s hysteresis (separate activate/deactivate thresholds rather
//! than one boundary) mirrors a dual-threshold trigger this runtime's
//! ambient stack already uses for SLO policy activation: a cheap, lock-free
//! signal dispatch reads on every call, updated periodically by a
//! background sampler rather than synchronously on the hot path.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;

/// Stress regime. Hysteresis between `Stressed` and `Recovering` avoids
/// flapping at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Normal,
    Stressed,
    Recovering,
}

impl Pattern {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Pattern::Stressed,
            2 => Pattern::Recovering,
            _ => Pattern::Normal,
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            Pattern::Normal => 0,
            Pattern::Stressed => 1,
            Pattern::Recovering => 2,
        }
    }
}

/// A point-in-time reading of the breathing controller.
#[derive(Debug, Clone, Copy)]
pub struct BreathingSnapshot {
    pub stress: f64,
    pub pattern: Pattern,
    pub current_rate: f64,
    pub breath_count: u64,
    pub is_recuperating: bool,
}

const STRESSED_THRESHOLD: f64 = 0.8;
const RECOVERED_THRESHOLD: f64 = 0.6;
const NORMAL_THRESHOLD: f64 = 0.5;

/// Fixed-point storage for `stress`/`current_rate` (both held as `f64 *
/// SCALE` in an `AtomicU64`) so readers never tear a concurrently-updated
/// float.
const SCALE: f64 = 1_000_000.0;

/// The stress formula's calibration knobs. Held behind an [`ArcSwap`] so an
/// operator can recalibrate a live runtime (e.g. after provisioning more
/// capacity raises the realistic peak call rate) without restarting it or
/// taking a lock on the hot path.
#[derive(Debug, Clone, Copy)]
pub struct Tunables {
    pub peak_rate: f64,
    pub target_latency_ms: f64,
}

pub struct Breathing {
    tunables: ArcSwap<Tunables>,
    sample_period: Duration,

    calls_in_window: AtomicU64,
    errors_in_window: AtomicU64,
    max_latency_in_window_ms: AtomicU64,

    stress_fixed: AtomicU64,
    rate_fixed: AtomicU64,
    pattern: AtomicU8,
    breath_count: AtomicU64,
}

impl Breathing {
    pub fn new(peak_rate: f64, target_latency_ms: f64, sample_period: Duration) -> Arc<Self> {
        Arc::new(Self {
            tunables: ArcSwap::from_pointee(Tunables {
                peak_rate: peak_rate.max(1.0),
                target_latency_ms: target_latency_ms.max(1.0),
            }),
            sample_period,
            calls_in_window: AtomicU64::new(0),
            errors_in_window: AtomicU64::new(0),
            max_latency_in_window_ms: AtomicU64::new(0),
            stress_fixed: AtomicU64::new(0),
            rate_fixed: AtomicU64::new((1.0 * SCALE) as u64),
            pattern: AtomicU8::new(Pattern::Normal.to_u8()),
            breath_count: AtomicU64::new(0),
        })
    }

    pub fn record_call(&self) {
        self.calls_in_window.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors_in_window.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_latency(&self, latency_ms: u64) {
        self.max_latency_in_window_ms.fetch_max(latency_ms, Ordering::Relaxed);
    }

    pub fn sample_period(&self) -> Duration {
        self.sample_period
    }

    /// Replaces the stress formula's calibration knobs in place. Takes
    /// effect on the next [`Breathing::sample`]; does not block callers
    /// currently reading `stress`/`current_rate`.
    pub fn recalibrate(&self, peak_rate: f64, target_latency_ms: f64) {
        self.tunables.store(Arc::new(Tunables {
            peak_rate: peak_rate.max(1.0),
            target_latency_ms: target_latency_ms.max(1.0),
        }));
    }

    pub fn tunables(&self) -> Tunables {
        *self.tunables.load_full()
    }

    /// Runs one sampling step: drains the window counters, recomputes
    /// `stress`, transitions `pattern` with hysteresis, and derives
    /// `current_rate`. Intended to be called on a fixed interval by a
    /// background task owned by [`crate::runtime::Runtime`].
    pub fn sample(&self) {
        let calls = self.calls_in_window.swap(0, Ordering::Relaxed) as f64;
        let errors = self.errors_in_window.swap(0, Ordering::Relaxed) as f64;
        let max_latency = self.max_latency_in_window_ms.swap(0, Ordering::Relaxed) as f64;

        let tunables = self.tunables.load();
        let call_rate = calls / tunables.peak_rate;
        let error_rate = if calls > 0.0 { errors / calls } else { 0.0 };
        let latency_factor = (max_latency / tunables.target_latency_ms).min(1.0);

        let stress = (0.5 * call_rate + 0.3 * error_rate + 0.2 * latency_factor).clamp(0.0, 1.0);
        self.stress_fixed.store((stress * SCALE) as u64, Ordering::Relaxed);

        let current = Pattern::from_u8(self.pattern.load(Ordering::Relaxed));
        let next = match current {
            Pattern::Normal | Pattern::Recovering if stress >= STRESSED_THRESHOLD => Pattern::Stressed,
            Pattern::Stressed if stress < RECOVERED_THRESHOLD => Pattern::Recovering,
            Pattern::Recovering if stress < NORMAL_THRESHOLD => Pattern::Normal,
            Pattern::Recovering if stress >= STRESSED_THRESHOLD => Pattern::Stressed,
            other => other,
        };
        self.pattern.store(next.to_u8(), Ordering::Relaxed);

        // current_rate scales from 1.0 at stress 0 to ~2.0 at stress 1.0.
        let rate = 1.0 + stress;
        self.rate_fixed.store((rate * SCALE) as u64, Ordering::Relaxed);
        self.breath_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn current_rate(&self) -> f64 {
        self.rate_fixed.load(Ordering::Relaxed) as f64 / SCALE
    }

    pub fn stress(&self) -> f64 {
        self.stress_fixed.load(Ordering::Relaxed) as f64 / SCALE
    }

    pub fn pattern(&self) -> Pattern {
        Pattern::from_u8(self.pattern.load(Ordering::Relaxed))
    }

    pub fn is_recuperating(&self) -> bool {
        matches!(self.pattern(), Pattern::Stressed)
    }

    pub fn snapshot(&self) -> BreathingSnapshot {
        BreathingSnapshot {
            stress: self.stress(),
            pattern: self.pattern(),
            current_rate: self.current_rate(),
            breath_count: self.breath_count.load(Ordering::Relaxed),
            is_recuperating: self.is_recuperating(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_window_yields_normal_pattern_and_unit_rate() {
        let breathing = Breathing::new(100.0, 50.0, Duration::from_secs(1));
        breathing.sample();
        assert_eq!(breathing.pattern(), Pattern::Normal);
        assert!((breathing.current_rate() - 1.0).abs() < 1e-9);
        assert!(!breathing.is_recuperating());
    }

    #[test]
    fn heavy_load_enters_stressed_and_recovers_with_hysteresis() {
        let breathing = Breathing::new(10.0, 50.0, Duration::from_secs(1));
        for _ in 0..10 {
            breathing.record_call();
        }
        for _ in 0..8 {
            breathing.record_error();
        }
        breathing.record_latency(500);
        breathing.sample();
        assert_eq!(breathing.pattern(), Pattern::Stressed);
        assert!(breathing.is_recuperating());

        // Quiet window: stress falls, but hysteresis keeps it in Recovering
        // rather than snapping straight back to Normal.
        breathing.sample();
        assert_eq!(breathing.pattern(), Pattern::Recovering);
        assert!(!breathing.is_recuperating());
    }
}
