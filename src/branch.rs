//! Hierarchical, path-scoped channel namespaces with cascading lifetime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::channel::{ChannelConfig, CompileReport};
use crate::dispatch::{CallOutcome, Dispatcher};
use crate::error::{BranchError, CompileError};
use crate::handler::Handler;
use crate::payload::Payload;
use crate::store::id_has_prefix;

const DEFAULT_MAX_DEPTH: usize = 5;

struct BranchNode {
    max_depth: usize,
    active: AtomicBool,
}

/// Tracks every branch's path, ancestry, and `maxDepth`, independent of the
/// channel/handler/payload stores (which only know flat ids). Shared by
/// every [`Branch`] handle descending from the same [`crate::runtime::Runtime`].
#[derive(Default)]
pub struct BranchRegistry {
    nodes: DashMap<String, BranchNode>,
}

impl BranchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn register_root(&self) {
        self.nodes.insert(
            String::new(),
            BranchNode { max_depth: DEFAULT_MAX_DEPTH, active: AtomicBool::new(true) },
        );
    }

    fn depth_of(&self, path: &str) -> usize {
        if path.is_empty() {
            0
        } else {
            path.matches('/').count() + 1
        }
    }

    fn is_active(&self, path: &str) -> bool {
        self.nodes.get(path).map(|n| n.active.load(Ordering::Acquire)).unwrap_or(false)
    }

    fn deactivate_prefix(&self, prefix: &str) {
        let doomed: Vec<String> =
            self.nodes.iter().map(|e| e.key().clone()).filter(|p| id_has_prefix(p, prefix)).collect();
        for path in doomed {
            if let Some(node) = self.nodes.get(&path) {
                node.active.store(false, Ordering::Release);
            }
            self.nodes.remove(&path);
        }
    }
}

/// True when a call originating from `caller_path` is permitted to reach
/// `target_path` through ordinary (non-absolute) addressing: the target
/// must be the caller itself or a strict descendant, or the caller must be
/// the root (an ancestor of everything). Sibling-to-sibling relative calls
/// are denied; reaching a sibling requires the caller to explicitly address
/// an absolute path, which bypasses this predicate entirely.
pub fn is_call_allowed(caller_path: &str, target_path: &str) -> bool {
    caller_path.is_empty() || target_path == caller_path || id_has_prefix(target_path, caller_path)
}

fn join(base: &str, local: &str) -> String {
    if base.is_empty() {
        local.to_string()
    } else {
        format!("{base}/{local}")
    }
}

/// A handle into one path-scoped namespace of channels. The root branch has
/// `path() == ""`; `action`/`on`/`call`/`forget` on any branch operate on
/// ids implicitly prefixed by its path.
#[derive(Clone)]
pub struct Branch {
    path: String,
    registry: Arc<BranchRegistry>,
    dispatcher: Arc<Dispatcher>,
}

impl Branch {
    pub(crate) fn new_root(registry: Arc<BranchRegistry>, dispatcher: Arc<Dispatcher>) -> Self {
        registry.register_root();
        Self { path: String::new(), registry, dispatcher }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn fq(&self, local_id: &str) -> String {
        join(&self.path, local_id)
    }

    /// Creates or replaces a channel scoped to this branch.
    ///
    /// A blocking compile rejection still leaves the channel id registered:
    /// a blocked `CompiledChannel` is inserted into the store so a later
    /// `call(id)` resolves to `CallError::Blocked` rather than `NotFound`,
    /// even though `action` itself returns the `CompileError` to this caller.
    pub fn action(&self, mut config: ChannelConfig) -> Result<CompileReport, CompileError> {
        config.id = self.fq(&config.id);
        match crate::channel::compile(config) {
            Ok(report) => {
                self.dispatcher.store.insert(report.channel.clone());
                Ok(report)
            }
            Err(err) => {
                if let Some(channel) = &err.blocked_channel {
                    self.dispatcher.store.insert(channel.clone());
                }
                Err(err)
            }
        }
    }

    pub fn on(&self, local_id: impl AsRef<str>, handler: Arc<dyn Handler>) {
        self.dispatcher.subscribers.insert(self.fq(local_id.as_ref()), handler);
    }

    /// Calls a channel. `target` starting with `/` is resolved as an
    /// absolute, root-relative id (explicit cross-branch navigation);
    /// otherwise it is resolved relative to this branch (always a
    /// self-or-descendant call by construction).
    pub async fn call(&self, target: &str, payload: Option<Payload>) -> CallOutcome {
        let resolved = if let Some(absolute) = target.strip_prefix('/') {
            absolute.to_string()
        } else {
            self.fq(target)
        };

        if !target.starts_with('/') && !is_call_allowed(&self.path, &resolved) {
            return CallOutcome::err(crate::error::CallError::CrossBranchDenied {
                caller: self.path.clone(),
                target: resolved,
            });
        }

        self.dispatcher.call(&resolved, payload).await
    }

    pub fn get(&self, local_id: &str) -> Option<Arc<crate::channel::CompiledChannel>> {
        self.dispatcher.store.get(&self.fq(local_id))
    }

    pub fn forget(&self, local_id: &str) -> bool {
        let id = self.fq(local_id);
        let removed = self.dispatcher.store.remove(&id).is_some();
        self.dispatcher.subscribers.remove(&id);
        self.dispatcher.cache.remove(&id);
        self.dispatcher.timekeeper.cancel_prefix(id);
        removed
    }

    /// Creates a child branch. `id` must not contain `/`; `max_depth`
    /// defaults to the root's default and is clamped so a descendant can
    /// never exceed any ancestor's configured maximum.
    pub fn create_child(&self, id: &str, max_depth: Option<usize>) -> Result<Branch, BranchError> {
        if id.contains('/') {
            return Err(BranchError::InvalidId(id.to_string()));
        }
        let child_path = join(&self.path, id);
        let parent_max_depth =
            self.registry.nodes.get(&self.path).map(|n| n.max_depth).unwrap_or(DEFAULT_MAX_DEPTH);
        let max_depth = max_depth.unwrap_or(parent_max_depth).min(parent_max_depth);
        let depth = self.registry.depth_of(&child_path);
        if depth > max_depth {
            return Err(BranchError::MaxDepthExceeded { max_depth });
        }

        self.registry.nodes.insert(
            child_path.clone(),
            BranchNode { max_depth, active: AtomicBool::new(true) },
        );

        Ok(Branch { path: child_path, registry: self.registry.clone(), dispatcher: self.dispatcher.clone() })
    }

    pub fn is_active(&self) -> bool {
        self.registry.is_active(&self.path)
    }

    /// Recursively destroys this branch: every descendant branch, every
    /// channel (and its handler, payload cache entry, and timers) whose id
    /// starts with this branch's path, is removed. The branch itself, and
    /// everything under it, is then permanently unreachable.
    pub fn destroy(&self) {
        self.registry.deactivate_prefix(&self.path);
        self.dispatcher.store.remove_prefix(&self.path);
        self.dispatcher.subscribers.remove_prefix(&self.path);
        self.dispatcher.cache.remove_prefix(&self.path);
        self.dispatcher.timekeeper.cancel_prefix(self.path.clone());
    }

    /// Every channel id currently registered under this branch's path.
    pub fn stats(&self) -> BranchStats {
        let channel_count =
            self.dispatcher.store.ids().into_iter().filter(|id| id_has_prefix(id, &self.path)).count();
        BranchStats { path: self.path.clone(), channel_count, active: self.is_active() }
    }
}

#[derive(Debug, Clone)]
pub struct BranchStats {
    pub path: String,
    pub channel_count: usize,
    pub active: bool,
}
