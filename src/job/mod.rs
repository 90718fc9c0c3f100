// src/job/mod.rs

//! Jobs and the queue that runs them.
//!
//! - [`handle`]: the live job, its copy-on-read snapshot and per-analyzer
//!   state.
//! - [`queue`]: pure FIFO admission bookkeeping.
//! - [`manager`]: the async `JobQueue` that spawns admitted jobs onto the
//!   engine.

pub mod handle;
pub mod manager;
pub mod queue;

pub use handle::{AnalyzerState, JobHandle, JobSnapshot};
pub use manager::{JobQueue, QueueSettings, QueueStats};
pub use queue::AdmissionQueue;
