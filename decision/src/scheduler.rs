//! Strategy-aware peer request scheduler.
//!
//! Two-level scheduling: the weighted round-robin allocator picks which peer
//! is served next, and that peer's task heap picks which of its requests.
//! A peer is served until its round allocation cannot cover its next task;
//! once every peer in the round is exhausted, the next `pop` starts a fresh
//! round from the latest weights.
//!
//! All state lives behind one mutex. Every public operation, including the
//! completion of a [`Task`] handle, takes it for its full duration, so
//! operations are linearizable and the scheduler never spawns work of its
//! own.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use blockswap_types::{Cid, Clock, MonotonicClock, PeerId, Receipt, WantEntry};

use crate::heap::IndexedHeap;
use crate::metrics::SchedulerMetrics;
use crate::partner::{ActivePartner, PeerRank};
use crate::rrq::{RoundPeer, RoundRobinQueue};
use crate::task::{QueuedTask, Task, TaskId};
use crate::task_index::{TaskIndex, TaskKey};
use crate::SchedulerConfig;

/// Point-in-time counters, taken under the scheduler mutex.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Peers that have ever pushed a request.
    pub partners: usize,
    /// Live queued tasks across all peers.
    pub queued: usize,
    /// Popped tasks not yet completed.
    pub in_flight: usize,
    /// Cancelled tasks not yet discarded.
    pub tombstones: usize,
    /// Peers left in the current round.
    pub round_peers: usize,
}

pub struct Scheduler {
    shared: Arc<Mutex<SchedulerState>>,
}

impl Scheduler {
    /// # Panics
    ///
    /// Panics if `config.round_burst` is zero.
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_clock(config, Arc::new(MonotonicClock::new()))
    }

    /// Build a scheduler that stamps tasks with `clock`.
    ///
    /// # Panics
    ///
    /// Panics if `config.round_burst` is zero.
    pub fn with_clock(config: SchedulerConfig, clock: Arc<dyn Clock>) -> Self {
        let state = SchedulerState {
            clock,
            next_task_id: 0,
            task_index: TaskIndex::new(),
            partners: HashMap::new(),
            peer_heap: IndexedHeap::new(),
            rrq: RoundRobinQueue::new(config.round_burst, config.strategy),
            compaction_threshold: config.compaction_threshold,
            metrics: None,
        };
        Self {
            shared: Arc::new(Mutex::new(state)),
        }
    }

    /// Report scheduling activity to `metrics`.
    pub fn with_metrics(self, metrics: Arc<SchedulerMetrics>) -> Self {
        self.lock().metrics = Some(metrics);
        self
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        lock_state(&self.shared)
    }

    /// Enqueue `entry` on behalf of `receipt.peer`.
    ///
    /// Ignored if the block is already in flight to that peer; a repeated
    /// want for a queued block only updates its priority.
    pub fn push(&self, entry: WantEntry, receipt: &Receipt) {
        self.lock().push(entry, receipt);
    }

    /// Next request to serve, or `None` when nothing is schedulable in the
    /// current round (including when a fresh round yields nothing).
    pub fn pop(&self) -> Option<Task> {
        let task = self.lock().pop()?;
        Some(Task::new(task, Arc::downgrade(&self.shared)))
    }

    /// Cancel the queued request for `cid` from `peer`. No effect once the
    /// block is in flight.
    pub fn remove(&self, cid: &Cid, peer: &PeerId) {
        self.lock().remove(cid, peer);
    }

    /// Refresh a known peer's weight without enqueueing anything. The new
    /// weight applies from the next round.
    pub fn update_peer(&self, receipt: &Receipt) {
        self.lock().update_peer(receipt);
    }

    /// Remaining allocation of `peer` in the current round.
    pub fn allocation_for_peer(&self, peer: &PeerId) -> Option<u64> {
        self.lock().rrq.allocation_for(peer)
    }

    /// Peers left in the current round, head first.
    pub fn round_peers(&self) -> Vec<RoundPeer> {
        self.lock().rrq.allocations().to_vec()
    }

    /// Live queued requests for `peer`.
    pub fn pending_requests(&self, peer: &PeerId) -> usize {
        self.lock().partners.get(peer).map_or(0, |p| p.requests)
    }

    pub fn is_in_flight(&self, peer: &PeerId, cid: &Cid) -> bool {
        self.lock()
            .partners
            .get(peer)
            .is_some_and(|p| p.is_active(cid))
    }

    /// Whether a task for `(peer, cid)` is resident in the queue, live or
    /// cancelled.
    pub fn contains_task(&self, peer: &PeerId, cid: &Cid) -> bool {
        self.lock().task_index.contains(&TaskKey::new(*peer, *cid))
    }

    /// Priority of the live queued task for `(peer, cid)`.
    pub fn task_priority(&self, peer: &PeerId, cid: &Cid) -> Option<i64> {
        let state = self.lock();
        let task = state.partners.get(peer)?.tasks.get(cid)?;
        (!task.trash).then_some(task.entry.priority)
    }

    /// Peer with the most outstanding requests.
    pub fn busiest_peer(&self) -> Option<PeerId> {
        self.lock().peer_heap.peek().map(|rank| rank.peer)
    }

    pub fn stats(&self) -> SchedulerStats {
        let state = self.lock();
        let mut stats = SchedulerStats {
            partners: state.partners.len(),
            round_peers: state.rrq.num_peers(),
            ..SchedulerStats::default()
        };
        for partner in state.partners.values() {
            stats.queued += partner.requests;
            stats.in_flight += partner.active_blocks.len();
            stats.tombstones += partner.tombstones;
        }
        stats
    }

    /// Verify every internal invariant.
    ///
    /// # Panics
    ///
    /// Panics with a description of the first violated invariant.
    pub fn assert_invariants(&self) {
        self.lock().assert_invariants();
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

/// Every mutation leaves the state consistent before anything can panic, so
/// a poisoned lock is safe to reuse.
pub(crate) fn lock_state(shared: &Mutex<SchedulerState>) -> MutexGuard<'_, SchedulerState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct SchedulerState {
    clock: Arc<dyn Clock>,
    next_task_id: u64,
    task_index: TaskIndex,
    partners: HashMap<PeerId, ActivePartner>,
    /// Partners ordered by outstanding requests; also witnesses that at
    /// least one peer is known.
    peer_heap: IndexedHeap<PeerRank>,
    rrq: RoundRobinQueue,
    compaction_threshold: usize,
    metrics: Option<Arc<SchedulerMetrics>>,
}

impl SchedulerState {
    fn push(&mut self, entry: WantEntry, receipt: &Receipt) {
        let peer = receipt.peer;
        let partner = match self.partners.entry(peer) {
            Entry::Occupied(occupied) => occupied.into_mut(),
            Entry::Vacant(vacant) => {
                self.peer_heap.push(PeerRank::new(peer));
                vacant.insert(ActivePartner::new(peer))
            }
        };

        if partner.is_active(&entry.cid) {
            tracing::trace!(peer = %peer, cid = %entry.cid, "block already in flight");
            return;
        }

        if self.task_index.contains(&TaskKey::new(peer, entry.cid)) {
            let revived = partner
                .tasks
                .update(&entry.cid, |task| {
                    task.entry.priority = entry.priority;
                    std::mem::replace(&mut task.trash, false)
                })
                .expect("indexed task missing from its peer queue");
            if revived {
                partner.tombstones -= 1;
                partner.requests += 1;
                let requests = partner.requests;
                self.peer_heap.update(&peer, |rank| rank.requests = requests);
                self.rrq.update_weight(peer, receipt);
                tracing::trace!(peer = %peer, cid = %entry.cid, "revived cancelled task");
            }
            return;
        }

        let id = TaskId::new(self.next_task_id);
        self.next_task_id += 1;
        partner.tasks.push(QueuedTask {
            id,
            entry,
            target: peer,
            created: self.clock.now(),
            trash: false,
        });
        partner.requests += 1;
        let requests = partner.requests;
        self.task_index.insert(TaskKey::new(peer, entry.cid), id);
        self.peer_heap.update(&peer, |rank| rank.requests = requests);
        self.rrq.update_weight(peer, receipt);

        if let Some(metrics) = &self.metrics {
            metrics.tasks_pushed.inc();
        }
        tracing::trace!(
            peer = %peer,
            cid = %entry.cid,
            priority = entry.priority,
            size = entry.size,
            "queued task"
        );
    }

    fn pop(&mut self) -> Option<QueuedTask> {
        let (peer, task) = self.next_task()?;
        let cid = task.entry.cid;

        let partner = self
            .partners
            .get_mut(&peer)
            .expect("scheduled peer has no partner record");
        partner.start_task(cid, task.id);
        partner.requests -= 1;
        let requests = partner.requests;
        self.task_index.remove(&TaskKey::new(peer, cid));
        self.peer_heap.update(&peer, |rank| rank.requests = requests);

        let head = self.rrq.head_mut().expect("round emptied during pop");
        head.allocation -= task.entry.size;
        let remaining = head.allocation;
        if remaining == 0 {
            self.rrq.pop();
        }

        if let Some(metrics) = &self.metrics {
            metrics.tasks_popped.inc();
            metrics.bytes_scheduled.inc_by(task.entry.size);
            metrics.task_size_bytes.observe(task.entry.size as f64);
            metrics.in_flight_tasks.inc();
            metrics.round_peers.set(self.rrq.num_peers() as i64);
        }
        tracing::trace!(peer = %peer, cid = %cid, remaining, "scheduled task");
        Some(task)
    }

    /// Find the next `(peer, task)` the current round can afford, starting
    /// a new round if the last one is spent.
    fn next_task(&mut self) -> Option<(PeerId, QueuedTask)> {
        if self.peer_heap.is_empty() {
            return None;
        }
        if self.rrq.num_peers() == 0 {
            self.rrq.init_round();
            if let Some(metrics) = &self.metrics {
                metrics.rounds_started.inc();
                metrics.round_peers.set(self.rrq.num_peers() as i64);
            }
            if self.rrq.num_peers() == 0 {
                return None;
            }
        }

        while let Some(head) = self.rrq.head() {
            let (peer, allocation) = (head.peer, head.allocation);
            let task = match self.partners.get_mut(&peer) {
                Some(partner) => {
                    let task_index = &mut self.task_index;
                    let metrics = &self.metrics;
                    partner.pop_live(|dropped| {
                        task_index.remove_if(&TaskKey::new(peer, dropped.entry.cid), dropped.id);
                        if let Some(metrics) = metrics {
                            metrics.tombstones_dropped.inc();
                        }
                        tracing::trace!(peer = %peer, cid = %dropped.entry.cid, "dropped cancelled task");
                    })
                }
                None => None,
            };

            match task {
                None => self.rrq.pop(),
                Some(task) if task.entry.size > allocation => {
                    tracing::trace!(
                        peer = %peer,
                        cid = %task.entry.cid,
                        size = task.entry.size,
                        allocation,
                        "task exceeds remaining allocation, deferring peer"
                    );
                    if let Some(partner) = self.partners.get_mut(&peer) {
                        partner.tasks.push(task);
                    }
                    self.rrq.pop();
                }
                Some(task) => return Some((peer, task)),
            }
        }
        None
    }

    fn remove(&mut self, cid: &Cid, peer: &PeerId) {
        if !self.task_index.contains(&TaskKey::new(*peer, *cid)) {
            return;
        }
        let partner = self
            .partners
            .get_mut(peer)
            .expect("indexed task for unknown peer");
        let newly_trashed = partner
            .tasks
            .update(cid, |task| !std::mem::replace(&mut task.trash, true))
            .expect("indexed task missing from its peer queue");
        if !newly_trashed {
            return;
        }
        partner.requests -= 1;
        partner.tombstones += 1;
        let requests = partner.requests;

        let compacted = if partner.needs_compaction(self.compaction_threshold) {
            partner.compact()
        } else {
            Vec::new()
        };
        for dropped in &compacted {
            self.task_index
                .remove_if(&TaskKey::new(*peer, dropped.entry.cid), dropped.id);
        }
        self.peer_heap.update(peer, |rank| rank.requests = requests);

        if let Some(metrics) = &self.metrics {
            metrics.tasks_cancelled.inc();
            metrics.tombstones_dropped.inc_by(compacted.len() as u64);
        }
        tracing::trace!(peer = %peer, cid = %cid, "cancelled task");
        if !compacted.is_empty() {
            tracing::debug!(peer = %peer, dropped = compacted.len(), "compacted peer queue");
        }
    }

    fn update_peer(&mut self, receipt: &Receipt) {
        let peer = receipt.peer;
        if !self.partners.contains_key(&peer) {
            return;
        }
        self.rrq.update_weight(peer, receipt);
        tracing::trace!(peer = %peer, value = receipt.value, "refreshed peer weight");
    }

    pub(crate) fn task_done(&mut self, peer: PeerId, cid: Cid, id: TaskId) {
        let Some(partner) = self.partners.get_mut(&peer) else {
            return;
        };
        if !partner.task_done(cid, id) {
            return;
        }
        if let Some(metrics) = &self.metrics {
            metrics.in_flight_tasks.dec();
        }
        tracing::trace!(peer = %peer, cid = %cid, "task done");
    }

    fn assert_invariants(&self) {
        assert!(self.peer_heap.is_consistent(), "peer heap out of order");
        assert_eq!(
            self.peer_heap.len(),
            self.partners.len(),
            "peer heap and partner map disagree"
        );

        let mut resident = 0;
        for (peer, partner) in &self.partners {
            assert_eq!(partner.peer, *peer);
            assert!(partner.tasks.is_consistent(), "task heap of {peer} out of order");

            let live = partner.tasks.iter().filter(|t| !t.trash).count();
            assert_eq!(partner.requests, live, "request count of {peer} drifted");
            assert_eq!(
                partner.tombstones,
                partner.tasks.len() - live,
                "tombstone count of {peer} drifted"
            );

            for task in partner.tasks.iter() {
                assert_eq!(task.target, *peer);
                assert_eq!(
                    self.task_index.get(&TaskKey::new(*peer, task.entry.cid)),
                    Some(task.id),
                    "task {} of {peer} missing from index",
                    task.entry.cid
                );
                assert!(
                    task.trash || !partner.is_active(&task.entry.cid),
                    "block {} of {peer} both queued and in flight",
                    task.entry.cid
                );
            }
            resident += partner.tasks.len();

            let rank = self
                .peer_heap
                .get(peer)
                .unwrap_or_else(|| panic!("{peer} missing from peer heap"));
            assert_eq!(rank.requests, partner.requests, "peer heap rank of {peer} stale");
        }
        assert_eq!(self.task_index.len(), resident, "index holds tasks no queue has");

        let round = self.rrq.allocations();
        for (i, rp) in round.iter().enumerate() {
            assert!(rp.allocation > 0, "spent peer {} left in round", rp.peer);
            assert!(
                round[..i].iter().all(|other| other.peer != rp.peer),
                "{} appears twice in round",
                rp.peer
            );
        }
    }
}
