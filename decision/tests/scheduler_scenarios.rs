//! End-to-end scheduling scenarios: peers pushing wantlists, the scheduler
//! draining them round by round, and callers completing tasks from several
//! threads.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use blockswap_decision::{
    RoundRobinQueue, Scheduler, SchedulerConfig, SchedulerMetrics, SchedulerStats, Strategy,
};
use blockswap_nullables::NullClock;
use blockswap_types::{Cid, PeerId, Receipt, WantEntry};
use blockswap_utils::{try_init_logging, LogFormat};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const LETTERS: &str = "abcdefghijklmnopqrstuvwxyz";

fn scheduler(round_burst: u64) -> Scheduler {
    try_init_logging(LogFormat::Human, "blockswap_decision=trace");
    Scheduler::with_clock(
        SchedulerConfig::new(round_burst, Strategy::Simple),
        Arc::new(NullClock::ticking(0, 1)),
    )
}

fn peer(n: u8) -> PeerId {
    PeerId::new([n; 32])
}

fn letter_cid(letter: char) -> Cid {
    Cid::for_data(letter.to_string().as_bytes())
}

fn letter_of(cid: &Cid) -> char {
    LETTERS
        .chars()
        .find(|&c| letter_cid(c) == *cid)
        .expect("cid is not a letter")
}

/// Push one task per letter for `receipt.peer`, `a` most urgent.
fn push_alphabet(s: &Scheduler, receipt: &Receipt, size: u64) {
    for (i, letter) in LETTERS.chars().enumerate() {
        s.push(
            WantEntry::new(letter_cid(letter), i64::MAX - i as i64, size),
            receipt,
        );
    }
}

/// Pop and complete tasks until the scheduler reports no work.
fn drain(s: &Scheduler) -> Vec<(PeerId, Cid, u64)> {
    let mut popped = Vec::new();
    while let Some(task) = s.pop() {
        popped.push((*task.target(), *task.cid(), task.entry().size));
        task.done();
        s.assert_invariants();
    }
    popped
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn single_peer_single_round_exact_fit() {
    let s = scheduler(100);
    let receipt = Receipt::new(peer(1), 1.0);
    for i in 0..20u8 {
        s.push(
            WantEntry::new(Cid::new([i; 32]), i64::MAX - i as i64, 5),
            &receipt,
        );
    }

    let mut bytes = 0;
    for i in 0..20u8 {
        let task = s.pop().expect("round still has allocation");
        assert_eq!(task.cid(), &Cid::new([i; 32]));
        bytes += task.entry().size;
    }
    assert_eq!(bytes, 100);
    assert!(s.pop().is_none());
    s.assert_invariants();
}

#[test]
fn single_peer_two_rounds() {
    let s = scheduler(100);
    let receipt = Receipt::new(peer(1), 1.0);
    push_alphabet(&s, &receipt, 5);

    let first_round: String = (0..20)
        .map(|_| letter_of(s.pop().expect("first round").cid()))
        .collect();
    assert_eq!(first_round, "abcdefghijklmnopqrst");
    assert!(s.round_peers().is_empty());

    let task = s.pop().expect("second round starts lazily");
    assert_eq!(letter_of(task.cid()), 'u');
    assert_eq!(s.allocation_for_peer(&peer(1)), Some(95));
}

#[test]
fn five_peers_proportional_weights() {
    let s = scheduler(150);
    let mut letters = LETTERS.chars();
    for n in 1..=5u8 {
        let receipt = Receipt::new(peer(n), n as f64);
        for _ in 0..n {
            let cid = letter_cid(letters.next().unwrap());
            s.push(WantEntry::new(cid, 1, 10), &receipt);
        }
    }

    let popped = drain(&s);
    assert_eq!(popped.len(), 15);

    let mut per_peer: HashMap<PeerId, u64> = HashMap::new();
    for (target, _, size) in &popped {
        *per_peer.entry(*target).or_default() += size;
    }
    for n in 1..=5u8 {
        assert_eq!(per_peer[&peer(n)], 10 * n as u64, "peer {n}");
    }
}

#[test]
fn zero_weight_peer_sits_out_the_round() {
    let mut rrq = RoundRobinQueue::new(100, Strategy::Simple);
    for n in 0..5u8 {
        rrq.update_weight(peer(n), &Receipt::new(peer(n), n as f64));
    }
    rrq.init_round();
    assert_eq!(rrq.num_peers(), 4);
    assert_eq!(rrq.allocation_for(&peer(0)), None);

    let s = scheduler(100);
    for n in 0..5u8 {
        s.push(
            WantEntry::new(Cid::new([n; 32]), 1, 1),
            &Receipt::new(peer(n), n as f64),
        );
    }
    let task = s.pop().expect("weighted peers have work");
    assert_ne!(task.target(), &peer(0));
    let round = s.round_peers();
    assert_eq!(round.len(), 4);
    assert!(round.iter().all(|rp| rp.peer != peer(0)));
    assert_eq!(s.pending_requests(&peer(0)), 1);
}

#[test]
fn cancel_consonants_and_drain() {
    let s = scheduler(1000);
    let receipt = Receipt::new(peer(1), 1.0);
    push_alphabet(&s, &receipt, 1);
    for letter in LETTERS.chars().filter(|c| !"aeiou".contains(*c)) {
        s.remove(&letter_cid(letter), &peer(1));
    }
    s.assert_invariants();

    let drained: String = drain(&s).iter().map(|(_, cid, _)| letter_of(cid)).collect();
    assert_eq!(drained, "aeiou");
    assert_eq!(s.stats().tombstones, 0);
}

#[test]
fn oversized_task_is_deferred() {
    let s = scheduler(100);
    let receipt = Receipt::new(peer(1), 1.0);
    s.push(WantEntry::new(letter_cid('a'), 1, 500), &receipt);

    for _ in 0..3 {
        assert!(s.pop().is_none());
        assert_eq!(s.pending_requests(&peer(1)), 1);
        assert!(s.contains_task(&peer(1), &letter_cid('a')));
        s.assert_invariants();
    }
}

#[test]
fn oversized_task_does_not_block_smaller_peers() {
    let s = scheduler(100);
    s.push(
        WantEntry::new(letter_cid('a'), 1, 500),
        &Receipt::new(peer(1), 1.0),
    );
    s.push(
        WantEntry::new(letter_cid('b'), 1, 10),
        &Receipt::new(peer(2), 1.0),
    );

    let task = s.pop().expect("second peer fits its allocation");
    assert_eq!(task.target(), &peer(2));
    assert_eq!(s.pending_requests(&peer(1)), 1);
}

// ---------------------------------------------------------------------------
// Deduplication and lifecycle
// ---------------------------------------------------------------------------

#[test]
fn repeated_push_updates_priority() {
    let s = scheduler(100);
    let receipt = Receipt::new(peer(1), 1.0);
    s.push(WantEntry::new(letter_cid('a'), 1, 1), &receipt);
    s.push(WantEntry::new(letter_cid('b'), 5, 1), &receipt);
    s.push(WantEntry::new(letter_cid('a'), 9, 1), &receipt);

    assert_eq!(s.pending_requests(&peer(1)), 2);
    assert_eq!(s.task_priority(&peer(1), &letter_cid('a')), Some(9));
    let order: String = drain(&s).iter().map(|(_, cid, _)| letter_of(cid)).collect();
    assert_eq!(order, "ab");
}

#[test]
fn push_while_in_flight_is_ignored() {
    let s = scheduler(100);
    let receipt = Receipt::new(peer(1), 1.0);
    s.push(WantEntry::new(letter_cid('a'), 1, 1), &receipt);
    let task = s.pop().unwrap();

    s.push(WantEntry::new(letter_cid('a'), 7, 1), &receipt);
    assert!(!s.contains_task(&peer(1), &letter_cid('a')));
    assert_eq!(s.pending_requests(&peer(1)), 0);
    assert!(s.pop().is_none());

    task.done();
    s.push(WantEntry::new(letter_cid('a'), 7, 1), &receipt);
    assert_eq!(s.pending_requests(&peer(1)), 1);
}

#[test]
fn same_block_for_two_peers_is_independent() {
    let s = scheduler(100);
    let cid = letter_cid('a');
    s.push(WantEntry::new(cid, 1, 1), &Receipt::new(peer(1), 1.0));
    s.push(WantEntry::new(cid, 1, 1), &Receipt::new(peer(2), 1.0));
    s.remove(&cid, &peer(1));

    let popped = drain(&s);
    assert_eq!(popped.len(), 1);
    assert_eq!(popped[0].0, peer(2));
}

#[test]
fn stale_handle_does_not_release_newer_task() {
    let s = scheduler(100);
    let receipt = Receipt::new(peer(1), 1.0);
    let cid = letter_cid('a');
    s.push(WantEntry::new(cid, 1, 1), &receipt);
    let first = s.pop().unwrap();
    let first_id = first.id();
    first.done();

    s.push(WantEntry::new(cid, 1, 1), &receipt);
    let second = s.pop().unwrap();
    assert_ne!(second.id(), first_id);
    assert!(s.is_in_flight(&peer(1), &cid));
    second.done();
    assert!(!s.is_in_flight(&peer(1), &cid));
}

#[test]
fn round_refills_after_exhaustion() {
    let s = scheduler(10);
    let receipt = Receipt::new(peer(1), 1.0);
    for i in 0..4u8 {
        s.push(WantEntry::new(Cid::new([i; 32]), 10 - i as i64, 5), &receipt);
    }
    assert!(s.pop().is_some());
    assert!(s.pop().is_some());
    assert!(s.round_peers().is_empty());
    assert!(s.pop().is_some(), "exhausted round must refill");
    assert_eq!(s.allocation_for_peer(&peer(1)), Some(5));
}

#[test]
fn weight_changes_apply_next_round() {
    let s = scheduler(100);
    for n in 1..=2u8 {
        let receipt = Receipt::new(peer(n), 1.0);
        for i in 0..20u8 {
            s.push(WantEntry::new(Cid::new([i; 32]), 1, 10), &receipt);
        }
    }
    let _first = s.pop().unwrap();
    assert_eq!(s.allocation_for_peer(&peer(2)), Some(50));

    s.update_peer(&Receipt::new(peer(2), 3.0));
    assert_eq!(s.allocation_for_peer(&peer(2)), Some(50));

    while !s.round_peers().is_empty() {
        s.pop().unwrap();
    }
    let _next = s.pop().unwrap();
    assert_eq!(s.allocation_for_peer(&peer(2)), Some(75));
}

#[test]
fn busiest_peer_tracks_outstanding_requests() {
    let s = scheduler(100);
    s.push(WantEntry::new(letter_cid('a'), 1, 1), &Receipt::new(peer(1), 1.0));
    for letter in ['b', 'c'] {
        s.push(WantEntry::new(letter_cid(letter), 1, 1), &Receipt::new(peer(2), 1.0));
    }
    assert_eq!(s.busiest_peer(), Some(peer(2)));

    s.remove(&letter_cid('b'), &peer(2));
    s.remove(&letter_cid('c'), &peer(2));
    assert_eq!(s.busiest_peer(), Some(peer(1)));
}

#[test]
fn custom_strategy_drives_allocation() {
    let strategy = Strategy::custom(|receipt: &Receipt| receipt.sent as f64);
    let s = Scheduler::with_clock(
        SchedulerConfig::new(100, strategy),
        Arc::new(NullClock::new(0)),
    );
    s.push(
        WantEntry::new(letter_cid('a'), 1, 1),
        &Receipt::new(peer(1), 0.0).with_traffic(1, 0, 0),
    );
    s.push(
        WantEntry::new(letter_cid('b'), 1, 1),
        &Receipt::new(peer(2), 0.0).with_traffic(3, 0, 0),
    );
    let _task = s.pop().unwrap();
    assert_eq!(s.allocation_for_peer(&peer(2)), Some(75));
}

#[test]
fn stats_and_metrics_agree() {
    let metrics = Arc::new(SchedulerMetrics::new());
    let s = scheduler(1000).with_metrics(Arc::clone(&metrics));
    let receipt = Receipt::new(peer(1), 1.0);
    push_alphabet(&s, &receipt, 10);
    s.remove(&letter_cid('z'), &peer(1));

    let held: Vec<_> = (0..3).map(|_| s.pop().unwrap()).collect();
    assert_eq!(
        s.stats(),
        SchedulerStats {
            partners: 1,
            queued: 22,
            in_flight: 3,
            tombstones: 1,
            round_peers: 1,
        }
    );
    assert_eq!(metrics.in_flight_tasks.get(), 3);
    assert_eq!(metrics.bytes_scheduled.get(), 30);
    drop(held);
    assert_eq!(metrics.in_flight_tasks.get(), 0);

    let text = metrics.gather_text();
    assert!(text.contains("blockswap_tasks_pushed_total 26"));
    assert!(text.contains("blockswap_tasks_cancelled_total 1"));
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[test]
fn concurrent_callers_never_double_schedule() {
    let s = Arc::new(scheduler(1_000_000));
    let workers = 4u8;
    let per_worker = 50u8;

    let pushers: Vec<_> = (0..workers)
        .map(|w| {
            let s = Arc::clone(&s);
            thread::spawn(move || {
                let receipt = Receipt::new(peer(w), 1.0 + w as f64);
                for i in 0..per_worker {
                    s.push(WantEntry::new(Cid::new([i; 32]), i as i64, 1), &receipt);
                }
            })
        })
        .collect();
    for handle in pushers {
        handle.join().unwrap();
    }
    s.assert_invariants();

    let poppers: Vec<_> = (0..workers)
        .map(|_| {
            let s = Arc::clone(&s);
            thread::spawn(move || {
                let mut seen = Vec::new();
                let mut idle = 0;
                while idle < 3 {
                    match s.pop() {
                        Some(task) => {
                            seen.push((*task.target(), *task.cid()));
                            task.done();
                            idle = 0;
                        }
                        None => idle += 1,
                    }
                }
                seen
            })
        })
        .collect();

    let mut all: Vec<(PeerId, Cid)> = Vec::new();
    for handle in poppers {
        all.extend(handle.join().unwrap());
    }
    let total = all.len();
    all.sort();
    all.dedup();
    assert_eq!(all.len(), total, "a task was scheduled twice");
    assert_eq!(total, workers as usize * per_worker as usize);
    assert_eq!(s.stats().in_flight, 0);
    s.assert_invariants();
}
