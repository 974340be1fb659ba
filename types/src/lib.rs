//! Fundamental types for the blockswap exchange layer.
//!
//! This crate defines the vocabulary shared by every other crate in the
//! workspace: content and peer identifiers, want entries, ledger receipts,
//! and the monotonic clock used to stamp queued work.

pub mod cid;
pub mod error;
pub mod peer;
pub mod receipt;
pub mod time;
pub mod want;

pub use cid::Cid;
pub use error::TypesError;
pub use peer::PeerId;
pub use receipt::Receipt;
pub use time::{Clock, MonotonicClock, Timestamp};
pub use want::WantEntry;
