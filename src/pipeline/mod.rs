//! Notification-to-record pipeline.
//!
//! Pulls raw notifications one at a time, enriches each with the key's
//! current value and TTL, and hands the structured event to the sink.
//! One notification is fully processed before the next is pulled, so at
//! most one lookup and one write are in flight and events reach the
//! sink in arrival order.
//!
//! The enrichment read races with further mutation of the key, so the
//! recorded value may be newer than the mutation that triggered the
//! notification. A key deleted between notification and read records as
//! an empty value.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::event::{operation_from_channel, truncate_value, KeyEvent, RawNotification};
use crate::sink::EventSink;
use crate::source::{KeyReader, Notifications, SourceError};

#[cfg(test)]
mod tests;

/// Errors that terminate the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Notification stream failed: {0}")]
    Stream(#[from] SourceError),
}

/// Counters for per-event outcomes.
///
/// Enrichment misses and dropped writes are absorbed by the loop; these
/// counters keep them visible to operators.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    /// Notifications received from the subscription.
    pub received: u64,
    /// Events durably written to the sink.
    pub written: u64,
    /// Events dropped after a failed write.
    pub dropped: u64,
    /// Enrichment reads that found no value for the key.
    pub misses: u64,
}

/// The notification-to-record pipeline.
pub struct Pipeline {
    reader: Arc<dyn KeyReader>,
    sink: Arc<dyn EventSink>,
    instance: String,
    stats: PipelineStats,
}

impl Pipeline {
    pub fn new(
        reader: Arc<dyn KeyReader>,
        sink: Arc<dyn EventSink>,
        instance: impl Into<String>,
    ) -> Self {
        Self {
            reader,
            sink,
            instance: instance.into(),
            stats: PipelineStats::default(),
        }
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Drive the loop until shutdown or terminal stream failure.
    ///
    /// The shutdown channel is checked on every iteration. Once the
    /// signal is observed the in-flight notification completes and no
    /// new one is pulled.
    pub async fn run(
        &mut self,
        notifications: &mut dyn Notifications,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), PipelineError> {
        info!(instance = %self.instance, "Pipeline running");

        loop {
            tokio::select! {
                message = notifications.recv() => match message {
                    Ok(Some(notification)) => {
                        self.stats.received += 1;
                        self.process(notification).await;
                    }
                    Ok(None) => {
                        info!("Notification stream ended");
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "Notification stream failed");
                        self.log_stats();
                        return Err(e.into());
                    }
                },
                changed = shutdown.changed() => {
                    // A dropped sender means no more signals can arrive;
                    // treat it like a shutdown request.
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutdown requested, draining");
                        break;
                    }
                }
            }
        }

        self.log_stats();
        Ok(())
    }

    /// Turn one raw notification into one recorded event.
    ///
    /// Never fails: enrichment misses resolve to empty state, and a
    /// rejected write is logged and counted, not propagated.
    async fn process(&mut self, notification: RawNotification) {
        let RawNotification { channel, key } = notification;
        let operation = operation_from_channel(&channel);

        debug!(operation = %operation, key = %key, "Received event");

        let mut value = match self.reader.read_value(&key).await {
            Some(value) => value,
            None => {
                self.stats.misses += 1;
                String::new()
            }
        };
        truncate_value(&mut value);

        let ttl = self.reader.read_ttl(&key).await;

        let event = KeyEvent {
            timestamp: Utc::now(),
            instance: self.instance.clone(),
            operation,
            key,
            value,
            ttl,
            field: None,
            client_info: None,
        };

        match self.sink.write(&event).await {
            Ok(()) => self.stats.written += 1,
            Err(e) => {
                self.stats.dropped += 1;
                warn!(
                    operation = %event.operation,
                    key = %event.key,
                    error = %e,
                    "Write failed, event dropped"
                );
            }
        }
    }

    fn log_stats(&self) {
        info!(
            received = self.stats.received,
            written = self.stats.written,
            dropped = self.stats.dropped,
            misses = self.stats.misses,
            "Pipeline stopped"
        );
    }
}
