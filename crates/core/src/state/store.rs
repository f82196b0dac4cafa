//! State store trait.
//!
//! Batch state is a handful of key-value records: the pending queue, the
//! batch progress, and bounded per-subject conversion histories. Stores are
//! synchronous; callers run on the async runtime but each call is a single
//! short read-modify-write.

use thiserror::Error;

use crate::optimizer::ConversionRecord;
use crate::scheduler::{BatchProgress, ConversionTask};

/// Errors from state persistence.
#[derive(Debug, Error)]
pub enum StateError {
    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(String),

    /// State blob could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Persistence for queue state, batch progress and conversion history.
pub trait StateStore: Send + Sync {
    /// Persists the whole pending queue as one unit.
    fn save_queue(&self, tasks: &[ConversionTask]) -> Result<(), StateError>;

    /// Loads the persisted queue; empty when none was saved.
    fn load_queue(&self) -> Result<Vec<ConversionTask>, StateError>;

    /// Drops the persisted queue.
    fn clear_queue(&self) -> Result<(), StateError>;

    /// Persists batch progress.
    fn save_progress(&self, progress: &BatchProgress) -> Result<(), StateError>;

    /// Loads batch progress, if any was saved.
    fn load_progress(&self) -> Result<Option<BatchProgress>, StateError>;

    /// Appends a conversion record to the subject's bounded history.
    fn append_record(&self, subject: &str, record: &ConversionRecord) -> Result<(), StateError>;

    /// Returns the subject's conversion history, newest last.
    fn records(&self, subject: &str) -> Result<Vec<ConversionRecord>, StateError>;
}
