//! ouroboros-idb-memory: in-memory host engine for ouroboros-idb
//!
//! Implements the host traits with IndexedDB semantics on top of a single
//! event-loop thread. Used by the adapter's tests and benchmarks, and as a
//! reference for what a host is expected to do.
//!
//! Failures are reported the way a browser would report them: a payload
//! named after the DOM exception (`ConstraintError`, `DataError`, ...).
//! [`MemoryFactory::inject_failure`] queues arbitrary payloads to exercise
//! error paths.
//!
//! Concurrent transactions are not isolated from each other: a write is
//! visible to every transaction as soon as its request runs.

mod database;
pub mod error;
mod event_loop;
mod factory;
mod state;
mod store;
mod transaction;

pub use error::MemoryError;
pub use factory::MemoryFactory;
