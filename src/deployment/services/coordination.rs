//! Per-project serialisation of lifecycle operations and tracking of
//! in-flight readiness polls.

use crate::deployment::domain::ProjectId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

/// Guard proving the holder is the only lifecycle writer for a project.
pub(crate) type ProjectGuard = OwnedMutexGuard<()>;

/// Named async locks keyed by project.
///
/// Entries nobody holds or waits on are pruned whenever a new slot is
/// requested, so the map only grows with concurrently busy projects.
#[derive(Debug, Default)]
pub(crate) struct ProjectLocks {
    slots: Mutex<HashMap<ProjectId, Arc<AsyncMutex<()>>>>,
}

impl ProjectLocks {
    fn slot(&self, project_id: ProjectId) -> Arc<AsyncMutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.retain(|id, slot| *id == project_id || Arc::strong_count(slot) > 1);
        Arc::clone(slots.entry(project_id).or_default())
    }

    /// Waits until the project's lock is free and takes it.
    pub(crate) async fn acquire(&self, project_id: ProjectId) -> ProjectGuard {
        self.slot(project_id).lock_owned().await
    }

    /// Takes the project's lock only if nobody holds it.
    pub(crate) fn try_acquire(&self, project_id: ProjectId) -> Option<ProjectGuard> {
        self.slot(project_id).try_lock_owned().ok()
    }
}

#[derive(Debug, Default)]
struct PollTable {
    next_generation: u64,
    polls: HashMap<ProjectId, (u64, CancellationToken)>,
}

fn lock_table(table: &Mutex<PollTable>) -> MutexGuard<'_, PollTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry of readiness polls currently running, one per project.
#[derive(Debug, Default)]
pub(crate) struct HealthPolls {
    table: Arc<Mutex<PollTable>>,
}

impl HealthPolls {
    /// Registers a new poll for `project_id`, cancelling any previous one.
    pub(crate) fn register(&self, project_id: ProjectId) -> PollRegistration {
        let token = CancellationToken::new();
        let mut table = lock_table(&self.table);
        table.next_generation = table.next_generation.wrapping_add(1);
        let generation = table.next_generation;
        if let Some((_, previous)) = table
            .polls
            .insert(project_id, (generation, token.clone()))
        {
            previous.cancel();
        }
        PollRegistration {
            table: Arc::clone(&self.table),
            project_id,
            generation,
            token,
        }
    }

    /// Cancels the project's in-flight poll. Returns whether one existed.
    pub(crate) fn cancel(&self, project_id: ProjectId) -> bool {
        let Some((_, token)) = lock_table(&self.table).polls.remove(&project_id) else {
            return false;
        };
        token.cancel();
        true
    }

    /// Returns whether a poll is registered for the project.
    pub(crate) fn is_polling(&self, project_id: ProjectId) -> bool {
        lock_table(&self.table).polls.contains_key(&project_id)
    }
}

/// Handle for one registered poll; unregisters itself when dropped.
#[derive(Debug)]
pub(crate) struct PollRegistration {
    table: Arc<Mutex<PollTable>>,
    project_id: ProjectId,
    generation: u64,
    token: CancellationToken,
}

impl PollRegistration {
    /// Returns the token the poll must observe.
    pub(crate) const fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for PollRegistration {
    fn drop(&mut self) {
        let mut table = lock_table(&self.table);
        let is_current = table
            .polls
            .get(&self.project_id)
            .is_some_and(|(generation, _)| *generation == self.generation);
        if is_current {
            table.polls.remove(&self.project_id);
        }
    }
}

/// Shared coordination state for the orchestrator and the reaper.
#[derive(Debug, Default)]
pub(crate) struct LifecycleCoordinator {
    locks: ProjectLocks,
    polls: HealthPolls,
}

impl LifecycleCoordinator {
    /// Returns the per-project lock table.
    pub(crate) const fn locks(&self) -> &ProjectLocks {
        &self.locks
    }

    /// Returns the in-flight poll registry.
    pub(crate) const fn polls(&self) -> &HealthPolls {
        &self.polls
    }
}
