//! `queue` crate: run requests waiting for a worker.
//!
//! The engine enqueues one [`Job`] per triggered execution; workers poll
//! [`JobQueue::dequeue`]. A Postgres-backed implementation lives with the
//! engine's store adapters; [`MemoryQueue`] serves tests and one-shot runs.

pub mod error;
pub mod job;
pub mod memory;

pub use error::QueueError;
pub use job::{Job, JobQueue, JobStatus, NewJob};
pub use memory::MemoryQueue;
