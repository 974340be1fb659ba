#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use blockswap_decision::{Scheduler, SchedulerConfig, Strategy};
use blockswap_types::{Cid, PeerId, Receipt, WantEntry};

#[derive(Arbitrary, Debug)]
enum Op {
    Push {
        peer: u8,
        cid: u8,
        priority: i64,
        size: u16,
        value: f64,
    },
    Remove {
        peer: u8,
        cid: u8,
    },
    Pop,
    /// Complete the held task at this index.
    Done(u8),
    UpdatePeer {
        peer: u8,
        value: f64,
    },
}

#[derive(Arbitrary, Debug)]
struct Input {
    round_burst: u16,
    compaction_threshold: u8,
    exponential: bool,
    ops: Vec<Op>,
}

// Drive the scheduler with arbitrary operation sequences, including
// non-finite receipt values, and check its invariants after every step.
fuzz_target!(|input: Input| {
    let strategy = if input.exponential {
        Strategy::Exponential
    } else {
        Strategy::Simple
    };
    let config = SchedulerConfig {
        round_burst: u64::from(input.round_burst).max(1),
        strategy,
        compaction_threshold: usize::from(input.compaction_threshold),
    };
    let scheduler = Scheduler::new(config);
    let mut held = Vec::new();

    for op in input.ops {
        match op {
            Op::Push {
                peer,
                cid,
                priority,
                size,
                value,
            } => {
                let peer = PeerId::new([peer % 8; 32]);
                let entry = WantEntry::new(Cid::new([cid % 32; 32]), priority, u64::from(size));
                scheduler.push(entry, &Receipt::new(peer, value));
            }
            Op::Remove { peer, cid } => {
                scheduler.remove(&Cid::new([cid % 32; 32]), &PeerId::new([peer % 8; 32]));
            }
            Op::Pop => {
                if let Some(task) = scheduler.pop() {
                    held.push(task);
                }
            }
            Op::Done(index) => {
                if !held.is_empty() {
                    let task = held.swap_remove(usize::from(index) % held.len());
                    task.done();
                }
            }
            Op::UpdatePeer { peer, value } => {
                scheduler.update_peer(&Receipt::new(PeerId::new([peer % 8; 32]), value));
            }
        }
        scheduler.assert_invariants();
    }
});
