//! Read-only ledger snapshots handed to the scheduler.

use serde::{Deserialize, Serialize};

use crate::PeerId;

/// A snapshot of one peer's ledger.
///
/// `value` is the peer's contribution score as computed by the accounting
/// layer. The traffic counters are informational; built-in strategies only
/// look at `value`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub peer: PeerId,
    pub value: f64,
    #[serde(default)]
    pub sent: u64,
    #[serde(default)]
    pub recv: u64,
    #[serde(default)]
    pub exchanged: u64,
}

impl Receipt {
    pub fn new(peer: PeerId, value: f64) -> Self {
        Self {
            peer,
            value,
            sent: 0,
            recv: 0,
            exchanged: 0,
        }
    }

    /// Attach byte counters from the ledger.
    pub fn with_traffic(mut self, sent: u64, recv: u64, exchanged: u64) -> Self {
        self.sent = sent;
        self.recv = recv;
        self.exchanged = exchanged;
        self
    }
}
