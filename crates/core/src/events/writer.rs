use tokio::sync::mpsc;
use tracing::{info, warn};

use super::{EventEnvelope, SinkEvent};

/// Drains the event channel and writes events to the log.
///
/// Runs until every handle is dropped.
pub struct EventWriter {
    rx: mpsc::Receiver<EventEnvelope>,
}

impl EventWriter {
    pub fn new(rx: mpsc::Receiver<EventEnvelope>) -> Self {
        Self { rx }
    }

    /// Receives the next envelope (exposed for tests and custom sinks).
    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        self.rx.recv().await
    }

    /// Consumes events until the channel closes.
    pub async fn run(mut self) {
        while let Some(envelope) = self.rx.recv().await {
            Self::write(&envelope);
        }
    }

    fn write(envelope: &EventEnvelope) {
        match &envelope.event {
            SinkEvent::BatchStarted { batch_id, total } => {
                info!(batch_id, total, "batch started");
            }
            SinkEvent::BatchCompleted {
                batch_id,
                processed,
                successful,
                failed,
                skipped,
                space_saved,
            } => {
                info!(
                    batch_id,
                    processed, successful, failed, skipped, space_saved, "batch completed"
                );
            }
            SinkEvent::BatchCancelled {
                batch_id,
                processed,
            } => {
                info!(batch_id, processed, "batch cancelled");
            }
            SinkEvent::TaskFailed {
                subject,
                error,
                retries,
            } => {
                warn!(subject, retries, %error, "task failed");
            }
            SinkEvent::TaskRetried {
                subject,
                retry_count,
                error,
            } => {
                info!(subject, retry_count, %error, "task scheduled for retry");
            }
            SinkEvent::ConversionCompleted {
                subject,
                format,
                space_saved,
            } => {
                info!(subject, format, space_saved, "conversion completed");
            }
            SinkEvent::ServeFallback { subject, error } => {
                warn!(subject, %error, "serving original after conversion failure");
            }
            SinkEvent::ServiceStarted { version } => {
                info!(version, "service started");
            }
        }
    }
}
