//! Nullable clock: deterministic time for testing.

use blockswap_types::{Clock, Timestamp};
use std::sync::atomic::{AtomicU64, Ordering};

/// A deterministic clock for testing.
///
/// Time only advances when you tell it to, or by `step` nanoseconds on every
/// read when built with [`NullClock::ticking`].
pub struct NullClock {
    current: AtomicU64,
    step: u64,
}

impl NullClock {
    /// A clock frozen at `initial` nanoseconds.
    pub fn new(initial: u64) -> Self {
        Self {
            current: AtomicU64::new(initial),
            step: 0,
        }
    }

    /// A clock that advances by `step` after every read, so consecutive
    /// reads are strictly increasing.
    pub fn ticking(initial: u64, step: u64) -> Self {
        Self {
            current: AtomicU64::new(initial),
            step,
        }
    }

    /// Advance time by a number of nanoseconds.
    pub fn advance(&self, nanos: u64) {
        self.current.fetch_add(nanos, Ordering::SeqCst);
    }

    /// Set the time to a specific value.
    pub fn set(&self, nanos: u64) {
        self.current.store(nanos, Ordering::SeqCst);
    }
}

impl Clock for NullClock {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.current.fetch_add(self.step, Ordering::SeqCst))
    }
}
