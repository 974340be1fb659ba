//! Queued tasks and the handles given to callers once a task is scheduled.

use std::cmp::Ordering;
use std::fmt;
use std::sync::{Mutex, Weak};

use blockswap_types::{Cid, PeerId, Timestamp, WantEntry};

use crate::heap::HeapItem;
use crate::scheduler::{lock_state, SchedulerState};

/// Scheduler-unique identifier of a queued task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

/// A request waiting in its peer's queue.
#[derive(Clone, Debug)]
pub(crate) struct QueuedTask {
    pub id: TaskId,
    pub entry: WantEntry,
    pub target: PeerId,
    pub created: Timestamp,
    /// Cancelled; discarded when it reaches the top of the queue.
    pub trash: bool,
}

impl QueuedTask {
    /// Higher priority first, then older first, then by cid.
    fn service_order(&self, other: &Self) -> Ordering {
        other
            .entry
            .priority
            .cmp(&self.entry.priority)
            .then_with(|| self.created.cmp(&other.created))
            .then_with(|| self.entry.cid.cmp(&other.entry.cid))
    }
}

impl HeapItem for QueuedTask {
    type Key = Cid;

    fn key(&self) -> Cid {
        self.entry.cid
    }

    fn precedes(&self, other: &Self) -> bool {
        self.service_order(other) == Ordering::Less
    }
}

/// A scheduled request handed out by [`Scheduler::pop`](crate::Scheduler::pop).
///
/// The block stays marked in flight for its peer (so repeated wants for it
/// are ignored) until the handle is completed, either explicitly with
/// [`Task::done`] or implicitly when the handle is dropped.
pub struct Task {
    id: TaskId,
    entry: WantEntry,
    target: PeerId,
    created: Timestamp,
    scheduler: Weak<Mutex<SchedulerState>>,
    completed: bool,
}

impl Task {
    pub(crate) fn new(task: QueuedTask, scheduler: Weak<Mutex<SchedulerState>>) -> Self {
        Self {
            id: task.id,
            entry: task.entry,
            target: task.target,
            created: task.created,
            scheduler,
            completed: false,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn entry(&self) -> &WantEntry {
        &self.entry
    }

    pub fn cid(&self) -> &Cid {
        &self.entry.cid
    }

    pub fn target(&self) -> &PeerId {
        &self.target
    }

    pub fn created(&self) -> Timestamp {
        self.created
    }

    /// Signal that the block has been sent (or abandoned).
    ///
    /// Must not be called while holding any lock the scheduler may need;
    /// it acquires the scheduler mutex.
    pub fn done(mut self) {
        self.complete();
    }

    fn complete(&mut self) {
        if std::mem::replace(&mut self.completed, true) {
            return;
        }
        if let Some(shared) = self.scheduler.upgrade() {
            lock_state(&shared).task_done(self.target, self.entry.cid, self.id);
        }
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        self.complete();
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("entry", &self.entry)
            .field("target", &self.target)
            .field("created", &self.created)
            .finish()
    }
}
