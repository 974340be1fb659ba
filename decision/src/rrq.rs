//! Weighted round-robin byte allocator.
//!
//! Each round divides a fixed byte budget (the round burst) between peers in
//! proportion to their strategy weights. The allocator is arithmetic only: it
//! holds weights and the current round's allocations, never any queued work,
//! so weight changes made mid-round only take effect at the next
//! [`RoundRobinQueue::init_round`].

use std::collections::BTreeMap;

use blockswap_types::{PeerId, Receipt};

use crate::Strategy;

/// Default bytes available per round.
pub const DEFAULT_ROUND_BURST: u64 = 1000;

/// One peer's remaining budget in the current round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundPeer {
    pub peer: PeerId,
    pub allocation: u64,
}

pub struct RoundRobinQueue {
    round_burst: u64,
    strategy: Strategy,
    /// Ordered by peer id, which fixes the per-round service order.
    weights: BTreeMap<PeerId, f64>,
    allocations: Vec<RoundPeer>,
}

impl RoundRobinQueue {
    /// # Panics
    ///
    /// Panics if `round_burst` is zero.
    pub fn new(round_burst: u64, strategy: Strategy) -> Self {
        assert!(round_burst > 0, "round burst must be positive");
        Self {
            round_burst,
            strategy,
            weights: BTreeMap::new(),
            allocations: Vec::new(),
        }
    }

    pub fn round_burst(&self) -> u64 {
        self.round_burst
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    /// Record the peer's weight for subsequent rounds.
    pub fn update_weight(&mut self, peer: PeerId, receipt: &Receipt) {
        let weight = self.strategy.weight(receipt);
        self.weights.insert(peer, weight);
    }

    pub fn weight_for(&self, peer: &PeerId) -> Option<f64> {
        self.weights.get(peer).copied()
    }

    /// Start a new round from the current weights.
    ///
    /// Peers whose share rounds down to zero bytes sit the round out.
    pub fn init_round(&mut self) {
        self.allocations.clear();
        let total: f64 = self.weights.values().sum();
        if !total.is_finite() {
            tracing::warn!(
                peers = self.weights.len(),
                "peer weights overflow, round left empty"
            );
            return;
        }
        if total <= 0.0 {
            return;
        }
        let burst = self.round_burst as f64;
        for (peer, &weight) in &self.weights {
            if weight <= 0.0 {
                continue;
            }
            let share = (weight * burst / total).floor();
            let allocation = (share as u64).min(self.round_burst);
            if allocation > 0 {
                self.allocations.push(RoundPeer {
                    peer: *peer,
                    allocation,
                });
            }
        }
        tracing::debug!(
            peers = self.allocations.len(),
            burst = self.round_burst,
            "initialised round"
        );
    }

    pub fn head(&self) -> Option<&RoundPeer> {
        self.allocations.first()
    }

    pub fn head_mut(&mut self) -> Option<&mut RoundPeer> {
        self.allocations.first_mut()
    }

    /// Drop the head peer from this round.
    pub fn pop(&mut self) {
        if !self.allocations.is_empty() {
            self.allocations.remove(0);
        }
    }

    /// Move the head to the back of the round without dropping it. After
    /// `num_peers()` shifts the round is back in its original order.
    pub fn shift(&mut self) {
        if self.allocations.len() >= 2 {
            self.allocations.rotate_left(1);
        }
    }

    /// Discard the current round; weights are kept.
    pub fn reset_allocations(&mut self) {
        self.allocations.clear();
    }

    pub fn num_peers(&self) -> usize {
        self.allocations.len()
    }

    pub fn allocations(&self) -> &[RoundPeer] {
        &self.allocations
    }

    /// Remaining allocation of `peer` in the current round.
    pub fn allocation_for(&self, peer: &PeerId) -> Option<u64> {
        self.allocations
            .iter()
            .find(|rp| rp.peer == *peer)
            .map(|rp| rp.allocation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(n: u8) -> PeerId {
        PeerId::new([n; 32])
    }

    fn queue_with(burst: u64, values: &[f64]) -> RoundRobinQueue {
        let mut rrq = RoundRobinQueue::new(burst, Strategy::Simple);
        for (i, &value) in values.iter().enumerate() {
            let p = peer(i as u8 + 1);
            rrq.update_weight(p, &Receipt::new(p, value));
        }
        rrq
    }

    #[test]
    fn proportional_allocations() {
        let mut rrq = queue_with(150, &[1.0, 2.0, 3.0, 4.0, 5.0]);
        rrq.init_round();
        let allocations: Vec<u64> = rrq.allocations().iter().map(|rp| rp.allocation).collect();
        assert_eq!(allocations, vec![10, 20, 30, 40, 50]);
    }

    #[test]
    fn zero_weight_peer_is_absent() {
        let mut rrq = queue_with(100, &[0.0, 1.0, 2.0, 3.0, 4.0]);
        rrq.init_round();
        assert_eq!(rrq.num_peers(), 4);
        assert_eq!(rrq.allocation_for(&peer(1)), None);
    }

    #[test]
    fn tiny_share_rounds_to_nothing() {
        let mut rrq = queue_with(10, &[1.0, 1000.0]);
        rrq.init_round();
        assert_eq!(rrq.num_peers(), 1);
        assert_eq!(rrq.head().map(|rp| rp.peer), Some(peer(2)));
    }

    #[test]
    fn all_zero_weights_give_empty_round() {
        let mut rrq = queue_with(100, &[0.0, -5.0]);
        rrq.init_round();
        assert_eq!(rrq.num_peers(), 0);
        assert!(rrq.head().is_none());
    }

    #[test]
    fn weight_update_waits_for_next_round() {
        let mut rrq = queue_with(100, &[1.0, 1.0]);
        rrq.init_round();
        rrq.update_weight(peer(1), &Receipt::new(peer(1), 3.0));
        assert_eq!(rrq.allocation_for(&peer(1)), Some(50));
        rrq.init_round();
        assert_eq!(rrq.allocation_for(&peer(1)), Some(75));
        assert_eq!(rrq.allocation_for(&peer(2)), Some(25));
    }

    #[test]
    fn pop_and_shift() {
        let mut rrq = queue_with(90, &[1.0, 1.0, 1.0]);
        rrq.init_round();
        rrq.shift();
        assert_eq!(rrq.head().map(|rp| rp.peer), Some(peer(2)));
        assert_eq!(rrq.allocations().last().map(|rp| rp.peer), Some(peer(1)));
        rrq.pop();
        assert_eq!(rrq.num_peers(), 2);
        rrq.pop();
        rrq.pop();
        rrq.pop();
        assert_eq!(rrq.num_peers(), 0);
        rrq.shift();
    }

    #[test]
    fn shifting_odd_round_once_per_peer_restores_it() {
        let mut rrq = queue_with(90, &[1.0, 1.0, 1.0]);
        rrq.init_round();
        let before = rrq.allocations().to_vec();
        for _ in 0..before.len() {
            rrq.shift();
        }
        assert_eq!(rrq.allocations(), before.as_slice());
    }

    #[test]
    fn overflowing_weights_give_empty_round() {
        let mut rrq = RoundRobinQueue::new(100, Strategy::custom(|_| 1e308));
        for n in 1..=2u8 {
            rrq.update_weight(peer(n), &Receipt::new(peer(n), 1.0));
        }
        assert_eq!(rrq.weight_for(&peer(1)), Some(1e308));
        rrq.init_round();
        assert_eq!(rrq.num_peers(), 0);
    }

    #[test]
    fn reset_keeps_weights() {
        let mut rrq = queue_with(100, &[1.0, 3.0]);
        rrq.init_round();
        let before = rrq.allocations().to_vec();
        rrq.reset_allocations();
        assert_eq!(rrq.num_peers(), 0);
        assert_eq!(rrq.weight_for(&peer(2)), Some(3.0));
        rrq.init_round();
        assert_eq!(rrq.allocations(), before.as_slice());
    }

    #[test]
    fn head_mut_spends_allocation() {
        let mut rrq = queue_with(100, &[1.0]);
        rrq.init_round();
        if let Some(head) = rrq.head_mut() {
            head.allocation -= 40;
        }
        assert_eq!(rrq.allocation_for(&peer(1)), Some(60));
    }

    #[test]
    #[should_panic(expected = "round burst must be positive")]
    fn zero_burst_panics() {
        RoundRobinQueue::new(0, Strategy::Simple);
    }
}
