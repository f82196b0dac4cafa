//! Types for the batch queue and scheduler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::converter::TargetFormat;
use crate::state::StateError;

/// Queue ordering priority. Ascending sort puts `High` first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Priority {
    /// File-size heuristic: cheap conversions first so progress feedback is
    /// responsive early in a run.
    pub fn for_size(size: u64) -> Self {
        if size < 500 * 1024 {
            Self::High
        } else if size < 2 * 1024 * 1024 {
            Self::Normal
        } else {
            Self::Low
        }
    }
}

/// One pending conversion, owned by the queue until it reaches a terminal
/// outcome (success, terminal failure or skip).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionTask {
    /// Root-relative source path.
    pub subject: String,
    /// Requested target format(s).
    pub target: TargetFormat,
    /// Re-convert even when artifacts already exist.
    pub force: bool,
    /// Queue priority.
    pub priority: Priority,
    /// Attempts made so far.
    pub retry_count: u32,
    /// Do not process before this instant (retry backoff).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,
    /// When the task was enqueued.
    pub created_at: DateTime<Utc>,
    /// Most recent failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl ConversionTask {
    /// Creates a fresh task with zero retries.
    pub fn new(subject: impl Into<String>, target: TargetFormat, force: bool, priority: Priority) -> Self {
        Self {
            subject: subject.into(),
            target,
            force,
            priority,
            retry_count: 0,
            not_before: None,
            created_at: Utc::now(),
            last_error: None,
        }
    }
}

/// Lifecycle of a batch: `idle -> running -> {completed, cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Idle,
    Running,
    Completed,
    Cancelled,
}

/// Number of recent error samples kept in progress.
pub const RECENT_ERROR_LIMIT: usize = 10;

/// Counters for one batch run. Invariants: `processed <= total`,
/// `successful + failed + skipped <= processed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchProgress {
    pub status: BatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    pub total: u64,
    pub processed: u64,
    pub successful: u64,
    pub failed: u64,
    pub skipped: u64,
    /// Total bytes saved across successful conversions.
    pub space_saved: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Bounded ring of recent error samples.
    #[serde(default)]
    pub recent_errors: Vec<String>,
}

impl Default for BatchProgress {
    fn default() -> Self {
        Self {
            status: BatchStatus::Idle,
            batch_id: None,
            total: 0,
            processed: 0,
            successful: 0,
            failed: 0,
            skipped: 0,
            space_saved: 0,
            start_time: None,
            end_time: None,
            recent_errors: Vec::new(),
        }
    }
}

impl BatchProgress {
    /// Records an error sample, dropping the oldest past the ring bound.
    pub fn push_error(&mut self, error: impl Into<String>) {
        self.recent_errors.push(error.into());
        if self.recent_errors.len() > RECENT_ERROR_LIMIT {
            self.recent_errors.remove(0);
        }
    }
}

/// Progress augmented with derived fields for API consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    #[serde(flatten)]
    pub progress: BatchProgress,
    /// `processed / total * 100`, 0 when total is 0.
    pub percentage: f64,
    /// Estimated seconds remaining while running; absent otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_secs: Option<u64>,
}

impl BatchReport {
    /// Derives the report fields from raw progress.
    pub fn from_progress(progress: BatchProgress, now: DateTime<Utc>) -> Self {
        let percentage = if progress.total == 0 {
            0.0
        } else {
            progress.processed as f64 / progress.total as f64 * 100.0
        };

        let eta_secs = match (progress.status, progress.start_time) {
            (BatchStatus::Running, Some(start)) if progress.processed > 0 => {
                let elapsed = (now - start).num_seconds().max(0) as f64;
                let per_item = elapsed / progress.processed as f64;
                let remaining = progress.total.saturating_sub(progress.processed) as f64;
                Some((per_item * remaining) as u64)
            }
            _ => None,
        };

        Self {
            progress,
            percentage,
            eta_secs,
        }
    }
}

/// Options for starting a batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchOptions {
    /// Target format, or all enabled formats.
    #[serde(default)]
    pub target: TargetFormat,
    /// Re-convert existing artifacts.
    #[serde(default)]
    pub force: bool,
    /// Cap on the number of enumerated originals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Offset into the enumerated originals.
    #[serde(default)]
    pub offset: usize,
    /// Explicit subject list; bypasses enumeration when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subjects: Option<Vec<String>>,
    /// Overrides the size heuristic for every task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

/// Errors returned synchronously by scheduler control operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A batch is already running; only one may run at a time.
    #[error("a batch is already running")]
    AlreadyRunning,

    /// No eligible tasks were found.
    #[error("no eligible conversion tasks found")]
    EmptyQueue,

    /// Manual conversion mode requires an explicit subject list.
    #[error("automatic enumeration is disabled in manual mode")]
    EnumerationDisabled,

    /// State persistence failed.
    #[error("state store error: {0}")]
    Store(#[from] StateError),

    /// Media enumeration failed.
    #[error("media scan failed: {0}")]
    Scan(#[from] std::io::Error),
}

/// Tunables for tick processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between ticks.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// Max tasks processed per tick.
    #[serde(default = "default_items_per_tick")]
    pub items_per_tick: usize,
    /// Soft wall-clock ceiling per tick, checked between tasks.
    #[serde(default = "default_tick_time_ceiling_secs")]
    pub tick_time_ceiling_secs: u64,
    /// Memory budget in bytes; 0 disables the check.
    #[serde(default)]
    pub memory_limit_bytes: u64,
    /// Fraction of the memory budget the tick may use.
    #[serde(default = "default_memory_fraction")]
    pub memory_fraction: f64,
    /// Attempt ceiling per task.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Linear backoff unit in seconds.
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            items_per_tick: default_items_per_tick(),
            tick_time_ceiling_secs: default_tick_time_ceiling_secs(),
            memory_limit_bytes: 0,
            memory_fraction: default_memory_fraction(),
            max_retries: default_max_retries(),
            retry_backoff_secs: default_retry_backoff_secs(),
        }
    }
}

fn default_tick_interval_secs() -> u64 {
    60
}

fn default_items_per_tick() -> usize {
    10
}

fn default_tick_time_ceiling_secs() -> u64 {
    25
}

fn default_memory_fraction() -> f64 {
    0.8
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_secs() -> u64 {
    60
}
