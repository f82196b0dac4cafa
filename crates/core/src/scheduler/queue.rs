//! Queue construction.
//!
//! Builds the ordered task list for a batch run, either from a media scan
//! or from an explicit subject list.

use crate::media::MediaLibrary;
use crate::scheduler::types::{BatchOptions, ConversionTask, Priority, SchedulerError};

/// Builds the ordered pending queue for a batch.
///
/// Ordering is priority class first, enumeration order within a class. The
/// sort is stable so equal-priority tasks keep their scan order.
pub async fn build_tasks(
    library: &MediaLibrary,
    options: &BatchOptions,
) -> Result<Vec<ConversionTask>, SchedulerError> {
    let mut tasks = match &options.subjects {
        Some(subjects) => {
            let mut tasks = Vec::with_capacity(subjects.len());
            for subject in subjects {
                let path = library.resolve(subject);
                let size = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);
                let priority = options
                    .priority
                    .unwrap_or_else(|| Priority::for_size(size));
                tasks.push(ConversionTask::new(
                    subject.clone(),
                    options.target,
                    options.force,
                    priority,
                ));
            }
            tasks
        }
        None => {
            let files = library.scan_window(options.limit, options.offset).await?;
            files
                .into_iter()
                .map(|file| {
                    let priority = options
                        .priority
                        .unwrap_or_else(|| Priority::for_size(file.size));
                    ConversionTask::new(file.subject, options.target, options.force, priority)
                })
                .collect()
        }
    };

    tasks.sort_by_key(|task| task.priority);
    Ok(tasks)
}
