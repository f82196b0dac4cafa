//! Batch scheduler implementation.
//!
//! Drives one batch at a time through tick-based processing. Every tick is
//! bounded by an item budget, a wall-clock ceiling and an optional memory
//! budget; whatever does not fit waits for the next tick.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::config::ConversionMode;
use crate::events::{EventHandle, SinkEvent};
use crate::media::MediaLibrary;
use crate::optimizer::Optimizer;
use crate::scheduler::queue::build_tasks;
use crate::scheduler::types::{
    BatchOptions, BatchProgress, BatchReport, BatchStatus, ConversionTask, Priority,
    SchedulerConfig, SchedulerError,
};
use crate::state::StateStore;

struct Inner {
    queue: VecDeque<ConversionTask>,
    progress: BatchProgress,
    since_flush: usize,
}

enum TaskOutcome {
    Success { space_saved: u64, errors: Vec<String> },
    Skipped,
    Failed(String),
    Retry(String),
}

/// Tasks flushed to the store every this many terminal outcomes, plus at
/// every tick end.
const FLUSH_EVERY: usize = 5;

/// The batch scheduler. One instance per service, shared behind an `Arc`.
pub struct BatchScheduler {
    config: SchedulerConfig,
    library: MediaLibrary,
    optimizer: Arc<Optimizer>,
    store: Arc<dyn StateStore>,
    events: Option<EventHandle>,
    running: AtomicBool,
    inner: Mutex<Inner>,
    shutdown_tx: broadcast::Sender<()>,
}

impl BatchScheduler {
    pub fn new(
        config: SchedulerConfig,
        library: MediaLibrary,
        optimizer: Arc<Optimizer>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            library,
            optimizer,
            store,
            events: None,
            running: AtomicBool::new(false),
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                progress: BatchProgress::default(),
                since_flush: 0,
            }),
            shutdown_tx,
        }
    }

    /// Sets the event handle.
    pub fn with_events(mut self, events: EventHandle) -> Self {
        self.events = Some(events);
        self
    }

    /// Whether a batch is currently active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Starts a new batch.
    ///
    /// Fails with `AlreadyRunning` before touching any state when a batch is
    /// active, and with `EmptyQueue` when enumeration yields no tasks. In
    /// manual conversion mode only explicit subject lists are accepted.
    pub async fn start(&self, options: BatchOptions) -> Result<BatchReport, SchedulerError> {
        let mut inner = self.inner.lock().await;
        if inner.progress.status == BatchStatus::Running {
            return Err(SchedulerError::AlreadyRunning);
        }
        if self.optimizer.settings().mode == ConversionMode::Manual && options.subjects.is_none() {
            return Err(SchedulerError::EnumerationDisabled);
        }

        let tasks = build_tasks(&self.library, &options).await?;
        if tasks.is_empty() {
            return Err(SchedulerError::EmptyQueue);
        }

        let batch_id = uuid::Uuid::new_v4().to_string();
        let total = tasks.len() as u64;
        inner.queue = tasks.into();
        inner.progress = BatchProgress {
            status: BatchStatus::Running,
            batch_id: Some(batch_id.clone()),
            total,
            start_time: Some(Utc::now()),
            ..Default::default()
        };
        inner.since_flush = 0;
        self.persist(&inner);
        self.running.store(true, Ordering::SeqCst);

        info!("Batch {} started with {} tasks", batch_id, total);
        if let Some(ref events) = self.events {
            events.emit(SinkEvent::BatchStarted { batch_id, total }).await;
        }

        Ok(BatchReport::from_progress(inner.progress.clone(), Utc::now()))
    }

    /// Cancels the running batch. Returns false when none is running.
    pub async fn cancel(&self) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.progress.status != BatchStatus::Running {
            return false;
        }

        inner.queue.clear();
        inner.progress.status = BatchStatus::Cancelled;
        inner.progress.end_time = Some(Utc::now());
        if let Err(e) = self.store.clear_queue() {
            warn!("Failed to clear persisted queue: {}", e);
        }
        if let Err(e) = self.store.save_progress(&inner.progress) {
            warn!("Failed to persist progress: {}", e);
        }
        self.running.store(false, Ordering::SeqCst);

        let batch_id = inner.progress.batch_id.clone().unwrap_or_default();
        info!(
            "Batch {} cancelled after {} items",
            batch_id, inner.progress.processed
        );
        if let Some(ref events) = self.events {
            events
                .emit(SinkEvent::BatchCancelled {
                    batch_id,
                    processed: inner.progress.processed,
                })
                .await;
        }
        true
    }

    /// Current progress with derived report fields.
    pub async fn progress(&self) -> BatchReport {
        let inner = self.inner.lock().await;
        BatchReport::from_progress(inner.progress.clone(), Utc::now())
    }

    /// Restores persisted state after a restart.
    ///
    /// A non-empty persisted queue resumes processing where the previous
    /// process left off. A running progress record with a drained queue is
    /// finalized as completed.
    pub async fn recover(&self) {
        let queue = match self.store.load_queue() {
            Ok(queue) => queue,
            Err(e) => {
                warn!("Failed to load persisted queue: {}", e);
                return;
            }
        };
        let progress = match self.store.load_progress() {
            Ok(progress) => progress,
            Err(e) => {
                warn!("Failed to load persisted progress: {}", e);
                None
            }
        };

        let mut inner = self.inner.lock().await;
        match progress {
            Some(progress) if progress.status == BatchStatus::Running => {
                if queue.is_empty() {
                    let mut progress = progress;
                    progress.status = BatchStatus::Completed;
                    progress.end_time = Some(Utc::now());
                    if let Err(e) = self.store.save_progress(&progress) {
                        warn!("Failed to persist progress: {}", e);
                    }
                    inner.progress = progress;
                    info!("Finalized drained batch from previous run");
                } else {
                    info!("Resuming interrupted batch with {} pending tasks", queue.len());
                    inner.queue = queue.into();
                    inner.progress = progress;
                    self.running.store(true, Ordering::SeqCst);
                }
            }
            Some(progress) => {
                inner.progress = progress;
            }
            None if !queue.is_empty() => {
                info!("Resuming interrupted batch with {} pending tasks", queue.len());
                inner.progress = BatchProgress {
                    status: BatchStatus::Running,
                    batch_id: Some(uuid::Uuid::new_v4().to_string()),
                    total: queue.len() as u64,
                    start_time: Some(Utc::now()),
                    ..Default::default()
                };
                inner.queue = queue.into();
                self.running.store(true, Ordering::SeqCst);
            }
            None => {}
        }
    }

    /// Spawns the periodic tick loop.
    pub fn spawn_tick_loop(self: &Arc<Self>) {
        let scheduler = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(scheduler.config.tick_interval_secs));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!("Scheduler tick loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Scheduler tick loop stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        scheduler.process_batch().await;
                    }
                }
            }
        });
    }

    /// Stops the tick loop and flushes state.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        let inner = self.inner.lock().await;
        self.persist(&inner);
    }

    /// Processes one tick of the running batch.
    ///
    /// A tick still in progress makes this a no-op; ticks never overlap.
    pub async fn process_batch(&self) {
        let Ok(mut inner) = self.inner.try_lock() else {
            debug!("Previous tick still in progress, skipping");
            return;
        };
        if inner.progress.status != BatchStatus::Running {
            return;
        }

        let started = Instant::now();
        let ceiling = Duration::from_secs(self.config.tick_time_ceiling_secs);
        let mut attempts = 0usize;
        let mut deferrals = 0usize;

        while attempts < self.config.items_per_tick {
            if started.elapsed() >= ceiling {
                debug!("Tick time ceiling reached after {} items", attempts);
                break;
            }
            if self.memory_exceeded() {
                warn!("Memory budget exceeded, ending tick early");
                break;
            }
            if !inner.queue.is_empty() && deferrals >= inner.queue.len() {
                // Everything left is backing off.
                break;
            }
            let Some(task) = inner.queue.pop_front() else {
                self.finalize(&mut inner).await;
                return;
            };

            if let Some(not_before) = task.not_before {
                if not_before > Utc::now() {
                    inner.queue.push_back(task);
                    deferrals += 1;
                    continue;
                }
            }

            attempts += 1;
            let outcome = self.run_task(&task).await;
            self.apply_outcome(&mut inner, task, outcome).await;

            if inner.since_flush >= FLUSH_EVERY {
                self.persist(&inner);
                inner.since_flush = 0;
            }
        }

        if inner.queue.is_empty() {
            self.finalize(&mut inner).await;
            return;
        }
        self.persist(&inner);
    }

    async fn run_task(&self, task: &ConversionTask) -> TaskOutcome {
        let path = self.library.resolve(&task.subject);
        let formats = self.optimizer.formats_for(task.target);
        if formats.is_empty() {
            return TaskOutcome::Skipped;
        }

        let can_retry = task.retry_count + 1 < self.config.max_retries;
        match self.optimizer.convert_formats(&path, &formats, task.force).await {
            Ok(outcome) => {
                if outcome.records.is_empty() && outcome.failures.is_empty() {
                    return TaskOutcome::Skipped;
                }
                let errors: Vec<String> = outcome
                    .failures
                    .iter()
                    .map(|f| format!("{} [{}]: {}", task.subject, f.format, f.error))
                    .collect();
                if outcome.any_success() {
                    TaskOutcome::Success {
                        space_saved: outcome.total_space_saved(),
                        errors,
                    }
                } else if outcome.any_retryable_failure() && can_retry {
                    TaskOutcome::Retry(errors.join("; "))
                } else {
                    TaskOutcome::Failed(errors.join("; "))
                }
            }
            Err(e) => {
                if e.is_retryable() && can_retry {
                    TaskOutcome::Retry(e.to_string())
                } else {
                    TaskOutcome::Failed(e.to_string())
                }
            }
        }
    }

    async fn apply_outcome(&self, inner: &mut Inner, task: ConversionTask, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::Success { space_saved, errors } => {
                inner.progress.processed += 1;
                inner.progress.successful += 1;
                inner.progress.space_saved += space_saved;
                for error in errors {
                    inner.progress.push_error(error);
                }
                inner.since_flush += 1;
            }
            TaskOutcome::Skipped => {
                inner.progress.processed += 1;
                inner.progress.skipped += 1;
                inner.since_flush += 1;
            }
            TaskOutcome::Failed(error) => {
                inner.progress.processed += 1;
                inner.progress.failed += 1;
                inner.progress.push_error(format!("{}: {}", task.subject, error));
                warn!("Task {} failed terminally: {}", task.subject, error);
                if let Some(ref events) = self.events {
                    events
                        .emit(SinkEvent::TaskFailed {
                            subject: task.subject.clone(),
                            error,
                            retries: task.retry_count,
                        })
                        .await;
                }
                inner.since_flush += 1;
            }
            TaskOutcome::Retry(error) => {
                let mut task = task;
                task.retry_count += 1;
                let backoff = self.config.retry_backoff_secs * u64::from(task.retry_count);
                task.not_before = Some(Utc::now() + chrono::Duration::seconds(backoff as i64));
                // Retried work yields to fresh work.
                task.priority = Priority::Low;
                task.last_error = Some(error.clone());
                debug!(
                    "Task {} retry {} scheduled in {}s",
                    task.subject, task.retry_count, backoff
                );
                if let Some(ref events) = self.events {
                    events
                        .emit(SinkEvent::TaskRetried {
                            subject: task.subject.clone(),
                            retry_count: task.retry_count,
                            error,
                        })
                        .await;
                }
                inner.queue.push_back(task);
            }
        }
    }

    async fn finalize(&self, inner: &mut Inner) {
        inner.progress.status = BatchStatus::Completed;
        inner.progress.end_time = Some(Utc::now());
        if let Err(e) = self.store.clear_queue() {
            warn!("Failed to clear persisted queue: {}", e);
        }
        if let Err(e) = self.store.save_progress(&inner.progress) {
            warn!("Failed to persist progress: {}", e);
        }
        self.running.store(false, Ordering::SeqCst);

        let progress = &inner.progress;
        info!(
            "Batch completed: {} successful, {} failed, {} skipped, {} bytes saved",
            progress.successful, progress.failed, progress.skipped, progress.space_saved
        );
        if let Some(ref events) = self.events {
            events
                .emit(SinkEvent::BatchCompleted {
                    batch_id: progress.batch_id.clone().unwrap_or_default(),
                    processed: progress.processed,
                    successful: progress.successful,
                    failed: progress.failed,
                    skipped: progress.skipped,
                    space_saved: progress.space_saved,
                })
                .await;
        }
    }

    fn persist(&self, inner: &Inner) {
        let queue: Vec<ConversionTask> = inner.queue.iter().cloned().collect();
        if let Err(e) = self.store.save_queue(&queue) {
            warn!("Failed to persist queue: {}", e);
        }
        if let Err(e) = self.store.save_progress(&inner.progress) {
            warn!("Failed to persist progress: {}", e);
        }
    }

    fn memory_exceeded(&self) -> bool {
        if self.config.memory_limit_bytes == 0 {
            return false;
        }
        let Ok(pid) = sysinfo::get_current_pid() else {
            return false;
        };
        let mut system = sysinfo::System::new();
        system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), true);
        let Some(process) = system.process(pid) else {
            return false;
        };
        let budget = (self.config.memory_limit_bytes as f64 * self.config.memory_fraction) as u64;
        process.memory() >= budget
    }
}
