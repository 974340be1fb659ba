//! Nullable infrastructure for deterministic testing.
//!
//! External dependencies of the scheduler (currently only time) are
//! abstracted behind traits in `blockswap-types`. This crate provides
//! implementations that return deterministic values and can be controlled
//! programmatically.

pub mod clock;

pub use clock::NullClock;
