//! Mock sink for testing.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{EventSink, Result, SinkError};
use crate::event::KeyEvent;

/// Mock sink that captures events in memory.
#[derive(Default)]
pub struct MockSink {
    events: RwLock<Vec<KeyEvent>>,
    fail_next: RwLock<u32>,
    close_calls: RwLock<u32>,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` writes fail.
    pub async fn fail_next_writes(&self, count: u32) {
        *self.fail_next.write().await = count;
    }

    /// Events captured so far.
    pub async fn events(&self) -> Vec<KeyEvent> {
        self.events.read().await.clone()
    }

    /// How many times `close` was called.
    pub async fn close_calls(&self) -> u32 {
        *self.close_calls.read().await
    }
}

#[async_trait]
impl EventSink for MockSink {
    async fn write(&self, event: &KeyEvent) -> Result<()> {
        let mut fail = self.fail_next.write().await;
        if *fail > 0 {
            *fail -= 1;
            return Err(SinkError::Write("injected write failure".to_string()));
        }
        drop(fail);

        self.events.write().await.push(event.clone());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        *self.close_calls.write().await += 1;
        Ok(())
    }
}
