//! Batch queue and tick-based scheduler.

mod queue;
mod runner;
mod types;

pub use queue::build_tasks;
pub use runner::BatchScheduler;
pub use types::{
    BatchOptions, BatchProgress, BatchReport, BatchStatus, ConversionTask, Priority,
    SchedulerConfig, SchedulerError, RECENT_ERROR_LIMIT,
};
