//! Error/stat event sink.
//!
//! Core components emit structured events through a cheap handle; a writer
//! task drains them. Emission never fails the caller.

mod handle;
mod writer;

pub use handle::{EventEnvelope, EventHandle};
pub use writer::EventWriter;

use serde::{Deserialize, Serialize};

/// Structured events emitted by the conversion core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkEvent {
    /// A batch run started.
    BatchStarted { batch_id: String, total: u64 },
    /// A batch drained its queue.
    BatchCompleted {
        batch_id: String,
        processed: u64,
        successful: u64,
        failed: u64,
        skipped: u64,
        space_saved: u64,
    },
    /// A batch was cancelled while running.
    BatchCancelled { batch_id: String, processed: u64 },
    /// A task reached a terminal failure.
    TaskFailed {
        subject: String,
        error: String,
        retries: u32,
    },
    /// A task was re-enqueued for retry.
    TaskRetried {
        subject: String,
        retry_count: u32,
        error: String,
    },
    /// One format conversion succeeded.
    ConversionCompleted {
        subject: String,
        format: String,
        space_saved: u64,
    },
    /// The serving path fell back to the original after a conversion error.
    ServeFallback { subject: String, error: String },
    /// The service started.
    ServiceStarted { version: String },
}

/// Creates a connected handle/writer pair.
pub fn create_event_sink(buffer: usize) -> (EventHandle, EventWriter) {
    let (tx, rx) = tokio::sync::mpsc::channel(buffer);
    (EventHandle::new(tx), EventWriter::new(rx))
}
