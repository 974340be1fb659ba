//! Per-peer scheduling state.

use std::collections::HashMap;

use blockswap_types::{Cid, PeerId};

use crate::heap::{HeapItem, IndexedHeap};
use crate::task::{QueuedTask, TaskId};

/// Everything the scheduler tracks for one remote peer.
pub(crate) struct ActivePartner {
    pub peer: PeerId,
    pub tasks: IndexedHeap<QueuedTask>,
    /// Blocks popped for this peer and not yet completed.
    pub active_blocks: HashMap<Cid, TaskId>,
    /// Live (non-trash) tasks in `tasks`.
    pub requests: usize,
    /// Trash tasks still sitting in `tasks`.
    pub tombstones: usize,
}

impl ActivePartner {
    pub fn new(peer: PeerId) -> Self {
        Self {
            peer,
            tasks: IndexedHeap::new(),
            active_blocks: HashMap::new(),
            requests: 0,
            tombstones: 0,
        }
    }

    pub fn start_task(&mut self, cid: Cid, id: TaskId) {
        let previous = self.active_blocks.insert(cid, id);
        assert!(previous.is_none(), "block {cid} already in flight for {}", self.peer);
    }

    /// Release `cid` if it is still held by task `id`. Returns whether
    /// anything was released.
    pub fn task_done(&mut self, cid: Cid, id: TaskId) -> bool {
        if self.active_blocks.get(&cid) == Some(&id) {
            self.active_blocks.remove(&cid);
            true
        } else {
            false
        }
    }

    pub fn is_active(&self, cid: &Cid) -> bool {
        self.active_blocks.contains_key(cid)
    }

    /// Pop tasks until a live one surfaces, handing every discarded
    /// tombstone to `on_drop`.
    pub fn pop_live(&mut self, mut on_drop: impl FnMut(&QueuedTask)) -> Option<QueuedTask> {
        while let Some(task) = self.tasks.pop() {
            if task.trash {
                self.tombstones -= 1;
                on_drop(&task);
                continue;
            }
            return Some(task);
        }
        None
    }

    /// Whether enough tombstones have piled up to be worth a rebuild.
    pub fn needs_compaction(&self, threshold: usize) -> bool {
        threshold > 0 && self.tombstones >= threshold && self.tombstones * 2 >= self.tasks.len()
    }

    /// Drop every tombstone from the queue and return them.
    pub fn compact(&mut self) -> Vec<QueuedTask> {
        let dropped = self.tasks.retain(|task| !task.trash);
        self.tombstones -= dropped.len();
        dropped
    }
}

/// Entry in the peer-priority heap: peers with more outstanding requests
/// come first, ties broken by peer id.
#[derive(Clone, Debug)]
pub(crate) struct PeerRank {
    pub peer: PeerId,
    pub requests: usize,
}

impl PeerRank {
    pub fn new(peer: PeerId) -> Self {
        Self { peer, requests: 0 }
    }
}

impl HeapItem for PeerRank {
    type Key = PeerId;

    fn key(&self) -> PeerId {
        self.peer
    }

    fn precedes(&self, other: &Self) -> bool {
        (self.requests, std::cmp::Reverse(self.peer)) > (other.requests, std::cmp::Reverse(other.peer))
    }
}
