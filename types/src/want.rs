//! Block request descriptors.

use serde::{Deserialize, Serialize};

use crate::Cid;

/// A single request for a block, as received in a peer's wantlist.
///
/// Higher `priority` is more urgent. `size` is the byte cost of serving the
/// block and is charged against the peer's round allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WantEntry {
    pub cid: Cid,
    pub priority: i64,
    #[serde(default)]
    pub size: u64,
}

impl WantEntry {
    pub fn new(cid: Cid, priority: i64, size: u64) -> Self {
        Self {
            cid,
            priority,
            size,
        }
    }
}
