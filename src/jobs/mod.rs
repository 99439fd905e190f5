//! Async job tracking: submit long-running summarization work, poll it later.
//!
//! Core components:
//! - `model`: Job record and status state machine (Pending → Running → Completed/Failed)
//! - `store`: In-memory map of job records behind one lock
//! - `pool`: Fixed-size worker pool fed by a FIFO queue
//! - `coordinator`: Validates, records, enqueues and finalizes jobs

pub mod coordinator;
pub mod model;
pub mod pool;
pub mod store;

pub use coordinator::{CoordinatorConfig, JobCoordinator, spawn_cleanup_task};
pub use model::{Job, JobInput, JobKind, JobStatus};
pub use pool::WorkerPool;
pub use store::{JobStore, JobSummary};
