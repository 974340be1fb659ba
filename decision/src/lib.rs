//! Decision layer of the block exchange: which peer is served next, and
//! which of its requests.
//!
//! The [`Scheduler`] keeps a priority queue of wanted blocks per peer and
//! divides each round's byte budget between peers in proportion to a
//! [`Strategy`] applied to their ledger receipts.

pub mod config;
pub mod error;
pub mod heap;
pub mod metrics;
mod partner;
pub mod rrq;
pub mod scheduler;
pub mod strategy;
pub mod task;
pub mod task_index;

pub use config::SchedulerConfig;
pub use error::DecisionError;
pub use heap::{HeapItem, IndexedHeap};
pub use metrics::SchedulerMetrics;
pub use rrq::{RoundPeer, RoundRobinQueue, DEFAULT_ROUND_BURST};
pub use scheduler::{Scheduler, SchedulerStats};
pub use strategy::{Strategy, WeightFn};
pub use task::{Task, TaskId};
pub use task_index::{TaskIndex, TaskKey};
