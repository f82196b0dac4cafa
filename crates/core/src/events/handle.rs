use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::SinkEvent;

/// Envelope wrapping an event with its emission time.
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub timestamp: DateTime<Utc>,
    pub event: SinkEvent,
}

/// Handle for emitting events.
///
/// Cheaply cloneable and shareable across tasks. If the channel is full or
/// closed, the error is logged but the caller is never blocked or failed.
#[derive(Clone)]
pub struct EventHandle {
    tx: mpsc::Sender<EventEnvelope>,
}

impl EventHandle {
    /// Creates a handle from a channel sender.
    pub fn new(tx: mpsc::Sender<EventEnvelope>) -> Self {
        Self { tx }
    }

    /// Emits an event asynchronously.
    pub async fn emit(&self, event: SinkEvent) {
        let envelope = EventEnvelope {
            timestamp: Utc::now(),
            event,
        };
        if let Err(e) = self.tx.send(envelope).await {
            tracing::error!("Failed to emit sink event: {}", e);
        }
    }

    /// Emits an event without blocking; drops it if the buffer is full.
    pub fn try_emit(&self, event: SinkEvent) -> bool {
        let envelope = EventEnvelope {
            timestamp: Utc::now(),
            event,
        };
        match self.tx.try_send(envelope) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to emit sink event: {}", e);
                false
            }
        }
    }
}
