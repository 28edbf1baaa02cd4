//! Pattern-matched fan-out of one call to many channels.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::dispatch::{CallOutcome, Dispatcher};
use crate::error::GroupError;
use crate::payload::Payload;

/// `*` matches exactly one path segment, `**` matches zero or more,
/// anchored at both ends of the pattern.
pub fn glob_match(pattern: &str, candidate: &str) -> bool {
    let pattern_segments: Vec<&str> = if pattern.is_empty() { Vec::new() } else { pattern.split('/').collect() };
    let candidate_segments: Vec<&str> = if candidate.is_empty() { Vec::new() } else { candidate.split('/').collect() };
    match_segments(&pattern_segments, &candidate_segments)
}

fn match_segments(pattern: &[&str], candidate: &[&str]) -> bool {
    match pattern.first() {
        None => candidate.is_empty(),
        Some(&"**") => {
            if match_segments(&pattern[1..], candidate) {
                return true;
            }
            if !candidate.is_empty() && match_segments(pattern, &candidate[1..]) {
                return true;
            }
            false
        }
        Some(&"*") => {
            !candidate.is_empty() && match_segments(&pattern[1..], &candidate[1..])
        }
        Some(seg) => {
            !candidate.is_empty() && candidate[0] == *seg && match_segments(&pattern[1..], &candidate[1..])
        }
    }
}

/// How a group dispatches to its resolved members.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Parallel,
    Sequential,
    Race,
    Waterfall,
}

/// What to do when a member call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStrategy {
    FailFast,
    Continue,
    Retry { max_attempts: u32 },
}

/// Which member results the caller gets back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectResults {
    First,
    Last,
    All,
}

#[derive(Debug, Clone)]
pub struct MemberResult {
    pub channel_id: String,
    pub outcome: CallOutcome,
}

#[derive(Debug, Clone)]
pub struct GroupOutcome {
    pub results: Vec<MemberResult>,
}

pub struct Group {
    pub id: String,
    pub member_patterns: Vec<String>,
    pub strategy: Strategy,
    pub error_strategy: ErrorStrategy,
    pub collect_results: CollectResults,
    pub dispatch_timeout: Duration,
    dispatcher: Arc<Dispatcher>,
}

impl Group {
    pub fn new(id: impl Into<String>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            id: id.into(),
            member_patterns: Vec::new(),
            strategy: Strategy::Parallel,
            error_strategy: ErrorStrategy::Continue,
            collect_results: CollectResults::Last,
            dispatch_timeout: Duration::from_secs(10),
            dispatcher,
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.member_patterns.push(pattern.into());
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_error_strategy(mut self, strategy: ErrorStrategy) -> Self {
        self.error_strategy = strategy;
        self
    }

    pub fn with_collect_results(mut self, mode: CollectResults) -> Self {
        self.collect_results = mode;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = timeout.clamp(Duration::from_millis(100), Duration::from_secs(300));
        self
    }

    /// Re-resolves membership against the current channel set. Duplicate
    /// matches across patterns collapse; results are lexicographically
    /// ordered so `sequential`/`waterfall` runs are deterministic.
    pub fn resolve_members(&self) -> Vec<String> {
        let all_ids = self.dispatcher.store.ids();
        let mut matched: Vec<String> = all_ids
            .into_iter()
            .filter(|id| self.member_patterns.iter().any(|p| glob_match(p, id)))
            .collect();
        matched.sort();
        matched.dedup();
        matched
    }

    pub async fn call(&self, payload: Payload) -> Result<GroupOutcome, GroupError> {
        let members = self.resolve_members();
        let run = self.dispatch_members(members, payload);

        match timeout(self.dispatch_timeout, run).await {
            Ok(outcome) => outcome.map(|o| self.apply_collect_results(o)),
            Err(_) => {
                let partial = Vec::new();
                Err(GroupError::Timeout { timeout_ms: self.dispatch_timeout.as_millis() as u64, partial })
            }
        }
    }

    /// Trims the full member result set down to what `collect_results` asks
    /// the caller to see. The full set is always computed (error strategies
    /// and the all-failed check need every member's outcome); this only
    /// governs what's handed back.
    fn apply_collect_results(&self, outcome: GroupOutcome) -> GroupOutcome {
        match self.collect_results {
            CollectResults::All => outcome,
            CollectResults::First => GroupOutcome { results: outcome.results.into_iter().take(1).collect() },
            CollectResults::Last => {
                GroupOutcome { results: outcome.results.into_iter().last().into_iter().collect() }
            }
        }
    }

    async fn dispatch_members(&self, members: Vec<String>, payload: Payload) -> Result<GroupOutcome, GroupError> {
        let mut results = Vec::new();

        match self.strategy {
            Strategy::Sequential => {
                for id in members {
                    let outcome = self.call_member_with_retry(&id, payload.clone()).await;
                    let failed = !outcome.ok;
                    results.push(MemberResult { channel_id: id, outcome });
                    if failed && self.error_strategy == ErrorStrategy::FailFast {
                        break;
                    }
                }
            }
            Strategy::Waterfall => {
                let mut current_payload = payload;
                for id in members {
                    let outcome = self.call_member_with_retry(&id, current_payload.clone()).await;
                    let failed = !outcome.ok;
                    if let Some(p) = outcome.payload.clone() {
                        current_payload = p;
                    }
                    results.push(MemberResult { channel_id: id, outcome });
                    if failed && self.error_strategy == ErrorStrategy::FailFast {
                        break;
                    }
                }
            }
            Strategy::Parallel => {
                let futures = members.into_iter().map(|id| {
                    let payload = payload.clone();
                    async move {
                        let outcome = self.call_member_with_retry(&id, payload).await;
                        MemberResult { channel_id: id, outcome }
                    }
                });
                results = futures::future::join_all(futures).await;
            }
            Strategy::Race => {
                let futures = members.into_iter().map(|id| {
                    let payload = payload.clone();
                    Box::pin(async move {
                        let outcome = self.call_member_with_retry(&id, payload).await;
                        MemberResult { channel_id: id, outcome }
                    })
                });
                let mut pending: Vec<_> = futures.collect();
                let mut winner = None;
                while !pending.is_empty() {
                    let (result, _idx, remaining) = futures::future::select_all(pending).await;
                    let succeeded = result.outcome.ok;
                    results.push(result.clone());
                    pending = remaining;
                    if succeeded {
                        winner = Some(result);
                        break;
                    }
                }
                if winner.is_none() {
                    let partial = results.iter().map(|r| (r.channel_id.clone(), r.outcome.ok)).collect();
                    return Err(GroupError::AllFailed { partial });
                }
            }
        }

        Ok(GroupOutcome { results })
    }

    async fn call_member_with_retry(&self, id: &str, payload: Payload) -> CallOutcome {
        let max_attempts = match self.error_strategy {
            ErrorStrategy::Retry { max_attempts } => max_attempts.max(1),
            _ => 1,
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = self.dispatcher.call(id, Some(payload.clone())).await;
            if outcome.ok || attempt >= max_attempts {
                return outcome;
            }
            tokio::time::sleep(Duration::from_millis(50 * attempt as u64)).await;
        }
    }
}

impl GroupOutcome {
    pub fn first(&self) -> Option<&MemberResult> {
        self.results.first()
    }

    pub fn last(&self) -> Option<&MemberResult> {
        self.results.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_single_segment() {
        assert!(glob_match("a/*/c", "a/b/c"));
        assert!(!glob_match("a/*/c", "a/b/x/c"));
    }

    #[test]
    fn double_star_matches_any_depth() {
        assert!(glob_match("a/**", "a"));
        assert!(glob_match("a/**", "a/b"));
        assert!(glob_match("a/**", "a/b/c"));
        assert!(!glob_match("a/**", "x/b"));
    }

    #[test]
    fn literal_segments_must_match_exactly() {
        assert!(glob_match("a/b", "a/b"));
        assert!(!glob_match("a/b", "a/c"));
    }
}
