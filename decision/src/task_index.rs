//! Global lookup from (peer, cid) to the queued task's id.

use std::collections::HashMap;
use std::fmt;

use blockswap_types::{Cid, PeerId};

use crate::task::TaskId;

/// Fingerprint of a request: the peer that asked and the block it asked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TaskKey {
    pub peer: PeerId,
    pub cid: Cid,
}

impl TaskKey {
    pub fn new(peer: PeerId, cid: Cid) -> Self {
        Self { peer, cid }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.peer, self.cid)
    }
}

/// Every task resident in some peer's queue, live or tombstoned.
#[derive(Default)]
pub struct TaskIndex {
    entries: HashMap<TaskKey, TaskId>,
}

impl TaskIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: TaskKey, id: TaskId) {
        self.entries.insert(key, id);
    }

    pub fn get(&self, key: &TaskKey) -> Option<TaskId> {
        self.entries.get(key).copied()
    }

    pub fn contains(&self, key: &TaskKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &TaskKey) -> Option<TaskId> {
        self.entries.remove(key)
    }

    /// Erase `key` only if it still refers to task `id`.
    pub fn remove_if(&mut self, key: &TaskKey, id: TaskId) -> bool {
        if self.get(key) == Some(id) {
            self.entries.remove(key);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
