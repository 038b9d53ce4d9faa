use std::{collections::BTreeSet, sync::Arc};

use tokio::sync::watch;

use crate::results::TaskId;

/// Set of probe tasks that are still running.
///
/// Becoming empty is the completion signal the controller waits on.
#[derive(Debug)]
pub struct TaskRegistry {
    live: watch::Sender<BTreeSet<TaskId>>,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        let (live, _) = watch::channel(BTreeSet::new());
        Self { live }
    }

    pub fn add(&self, id: TaskId) -> bool {
        self.live.send_if_modified(|live| live.insert(id))
    }

    pub fn remove(&self, id: TaskId) -> bool {
        self.live.send_if_modified(|live| live.remove(&id))
    }

    /// Adds `id` and returns a guard that removes it again when dropped, including
    /// when the owning task unwinds. `None` if `id` is already registered.
    pub fn register(self: &Arc<Self>, id: TaskId) -> Option<Registration> {
        self.add(id).then(|| Registration {
            id,
            registry: Arc::clone(self),
        })
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.live.borrow().contains(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.live.borrow().is_empty()
    }

    pub fn len(&self) -> usize {
        self.live.borrow().len()
    }

    /// Copy of the live ids; safe to walk while tasks keep deregistering.
    pub fn live_ids(&self) -> Vec<TaskId> {
        self.live.borrow().iter().copied().collect()
    }

    /// Resolves once no task is registered.
    pub async fn wait_empty(&self) {
        let mut live = self.live.subscribe();
        // the sender lives in `self`, so the channel cannot close while we wait
        let _ = live.wait_for(BTreeSet::is_empty).await;
    }
}

#[derive(Debug)]
pub struct Registration {
    id: TaskId,
    registry: Arc<TaskRegistry>,
}

impl Registration {
    pub fn id(&self) -> TaskId {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}
