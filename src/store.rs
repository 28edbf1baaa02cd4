//! The three shared maps dispatch, compilation, and branches operate on.
//!
//! Sharded concurrent maps (`dashmap`) keyed by the fully-qualified channel
//! id: mutation of one id's entry never contends with an unrelated id's, and
//! readers never observe a torn record, matching the "no user-visible lock,
//! but never a torn write" requirement.

use std::sync::Arc;

use dashmap::DashMap;

use crate::channel::CompiledChannel;
use crate::handler::Handler;
use crate::payload::Payload;

/// A snapshot of the last payload seen by a channel's handler, used by
/// change detection and by read-only accessors (`get`).
#[derive(Debug, Clone)]
pub struct PayloadCacheEntry {
    pub previous: Option<Payload>,
    pub current: Payload,
    pub timestamp_ms: u64,
}

/// Compiled channels, keyed by fully-qualified id. Only the compiler writes
/// a given entry (via `action`/replacement); dispatch only reads.
#[derive(Default)]
pub struct ChannelStore {
    channels: DashMap<String, Arc<CompiledChannel>>,
}

impl ChannelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, channel: Arc<CompiledChannel>) {
        self.channels.insert(channel.id().to_string(), channel);
    }

    pub fn get(&self, id: &str) -> Option<Arc<CompiledChannel>> {
        self.channels.get(id).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, id: &str) -> Option<Arc<CompiledChannel>> {
        self.channels.remove(id).map(|(_, v)| v)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.channels.contains_key(id)
    }

    pub fn remove_prefix(&self, prefix: &str) -> Vec<String> {
        let to_remove: Vec<String> = self
            .channels
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|id| id_has_prefix(id, prefix))
            .collect();
        for id in &to_remove {
            self.channels.remove(id);
        }
        to_remove
    }

    pub fn clear(&self) {
        self.channels.clear();
    }

    pub fn ids(&self) -> Vec<String> {
        self.channels.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// True when `id` is exactly `prefix` or nested under `prefix/`.
pub fn id_has_prefix(id: &str, prefix: &str) -> bool {
    id == prefix || id.starts_with(&format!("{prefix}/"))
}

/// Handlers, keyed by fully-qualified channel id. At most one handler per
/// channel; re-registering replaces.
#[derive(Default)]
pub struct SubscriberStore {
    handlers: DashMap<String, Arc<dyn Handler>>,
}

impl SubscriberStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: impl Into<String>, handler: Arc<dyn Handler>) {
        self.handlers.insert(id.into(), handler);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(id).map(|e| e.value().clone())
    }

    pub fn remove(&self, id: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.remove(id).map(|(_, v)| v)
    }

    pub fn remove_prefix(&self, prefix: &str) {
        let to_remove: Vec<String> = self
            .handlers
            .iter()
            .map(|e| e.key().clone())
            .filter(|id| id_has_prefix(id, prefix))
            .collect();
        for id in to_remove {
            self.handlers.remove(&id);
        }
    }

    pub fn clear(&self) {
        self.handlers.clear();
    }

    pub fn count(&self) -> usize {
        self.handlers.len()
    }
}

/// Last-payload-per-channel cache. Only the dispatch engine writes a given
/// entry, and only on an accepted handler invocation; protection-rejected
/// calls never touch it.
#[derive(Default)]
pub struct PayloadCache {
    entries: DashMap<String, PayloadCacheEntry>,
}

impl PayloadCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<PayloadCacheEntry> {
        self.entries.get(id).map(|e| e.value().clone())
    }

    pub fn record(&self, id: &str, payload: Payload, now_ms: u64) {
        let previous = self.entries.get(id).map(|e| e.value().current.clone());
        self.entries.insert(
            id.to_string(),
            PayloadCacheEntry { previous, current: payload, timestamp_ms: now_ms },
        );
    }

    pub fn remove(&self, id: &str) {
        self.entries.remove(id);
    }

    pub fn remove_prefix(&self, prefix: &str) {
        let to_remove: Vec<String> = self
            .entries
            .iter()
            .map(|e| e.key().clone())
            .filter(|id| id_has_prefix(id, prefix))
            .collect();
        for id in to_remove {
            self.entries.remove(&id);
        }
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
