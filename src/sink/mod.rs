//! Durable event sinks.
//!
//! `EventSink` is the hand-off boundary for the pipeline: one structured
//! event per call, persisted or rejected as a unit. Sinks do not buffer
//! or retry; a rejected write is the caller's outcome to handle.

mod clickhouse;
pub mod mock;

pub use self::clickhouse::ClickHouseSink;
pub use self::mock::MockSink;

use async_trait::async_trait;

use crate::event::KeyEvent;

/// Result type for sink operations.
pub type Result<T> = std::result::Result<T, SinkError>;

/// Errors that can occur during sink operations.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Write failed: {0}")]
    Write(String),
}

/// Interface for durable event persistence.
///
/// Implementations:
/// - `ClickHouseSink`: ClickHouse over HTTP
/// - `MockSink`: In-memory capture for testing
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Persist one event. All-or-nothing from the caller's view.
    async fn write(&self, event: &KeyEvent) -> Result<()>;

    /// Release sink resources. Idempotent, safe after failed writes.
    async fn close(&self) -> Result<()>;
}
