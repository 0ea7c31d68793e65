//! Task registry: at most one running operation per identifier.
//!
//! Operations are registered with the cancellation token their task
//! watches. Registering under an identifier that is already taken cancels
//! the previous token before the new entry becomes visible. Operations
//! without an identifier are tracked too, so teardown reaches them.
//!
//! Every registration gets a generation number. A task removes itself on
//! completion only if its generation is still the registered one, so an
//! old task winding down after being replaced never evicts its successor.

use crate::core::EffectId;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

struct Entry {
    generation: u64,
    token: CancellationToken,
}

impl Entry {
    fn cancel(self) {
        self.token.cancel();
    }
}

#[derive(Default)]
struct Inner {
    keyed: DashMap<EffectId, Entry>,
    untracked: DashMap<u64, CancellationToken>,
    next_generation: AtomicU64,
}

/// Proof of registration, handed back to [`TaskRegistry::on_completed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskTicket {
    id: Option<EffectId>,
    generation: u64,
}

impl TaskTicket {
    pub fn id(&self) -> Option<&EffectId> {
        self.id.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Bookkeeping for in-flight operations.
///
/// Cloning shares the same registry.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("keyed", &self.inner.keyed.len())
            .field("untracked", &self.inner.untracked.len())
            .finish()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task's cancellation token.
    ///
    /// If `id` is already registered the old token is cancelled first.
    pub fn register(&self, id: Option<EffectId>, token: CancellationToken) -> TaskTicket {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        match &id {
            Some(key) => {
                let replaced = self
                    .inner
                    .keyed
                    .insert(key.clone(), Entry { generation, token });
                if let Some(previous) = replaced {
                    trace!(
                        id = %key,
                        replaced = previous.generation,
                        "replacing running operation"
                    );
                    previous.cancel();
                }
            }
            None => {
                self.inner.untracked.insert(generation, token);
            }
        }
        TaskTicket { id, generation }
    }

    /// Cancel and forget the task registered under `id`. Unknown ids are
    /// ignored.
    pub fn cancel(&self, id: &EffectId) -> bool {
        match self.inner.keyed.remove(id) {
            Some((_, entry)) => {
                entry.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel and forget every task. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let mut cancelled = 0;
        self.inner.keyed.retain(|_, entry| {
            entry.token.cancel();
            cancelled += 1;
            false
        });
        self.inner.untracked.retain(|_, token| {
            token.cancel();
            cancelled += 1;
            false
        });
        cancelled
    }

    /// Remove a finished task, unless it was already replaced or removed.
    pub fn on_completed(&self, ticket: &TaskTicket) -> bool {
        match &ticket.id {
            Some(id) => self
                .inner
                .keyed
                .remove_if(id, |_, entry| entry.generation == ticket.generation)
                .is_some(),
            None => self.inner.untracked.remove(&ticket.generation).is_some(),
        }
    }

    pub fn contains(&self, id: &EffectId) -> bool {
        self.inner.keyed.contains_key(id)
    }

    /// Number of registered tasks, with or without an identifier.
    pub fn len(&self) -> usize {
        self.inner.keyed.len() + self.inner.untracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identifiers with a running task.
    pub fn ids(&self) -> Vec<EffectId> {
        self.inner.keyed.iter().map(|entry| entry.key().clone()).collect()
    }
}
