//! Mock source implementations for testing.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;

use super::{KeyReader, Notifications, Result, SourceError};
use crate::event::RawNotification;

/// Mock key reader backed by a fixed map of entries.
#[derive(Debug, Default)]
pub struct MockKeyReader {
    entries: HashMap<String, (String, Option<u32>)>,
}

impl MockKeyReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key with its value and optional TTL.
    pub fn with_entry(mut self, key: &str, value: &str, ttl: Option<u32>) -> Self {
        self.entries
            .insert(key.to_string(), (value.to_string(), ttl));
        self
    }
}

#[async_trait]
impl KeyReader for MockKeyReader {
    async fn read_value(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|(value, _)| value.clone())
    }

    async fn read_ttl(&self, key: &str) -> Option<u32> {
        self.entries.get(key).and_then(|(_, ttl)| *ttl)
    }
}

/// What a [`ScriptedNotifications`] feed does once its messages run out.
#[derive(Debug, Clone, Copy)]
pub enum Tail {
    /// Report a graceful close.
    Close,
    /// Suspend forever, until the consumer is cancelled.
    Pend,
    /// Surface a terminal stream error.
    Fail,
}

/// Scripted notification feed for pipeline tests.
pub struct ScriptedNotifications {
    queue: VecDeque<RawNotification>,
    tail: Tail,
}

impl ScriptedNotifications {
    pub fn new(messages: Vec<RawNotification>, tail: Tail) -> Self {
        Self {
            queue: messages.into(),
            tail,
        }
    }
}

#[async_trait]
impl Notifications for ScriptedNotifications {
    async fn recv(&mut self) -> Result<Option<RawNotification>> {
        match self.queue.pop_front() {
            Some(notification) => Ok(Some(notification)),
            None => match self.tail {
                Tail::Close => Ok(None),
                Tail::Pend => std::future::pending().await,
                Tail::Fail => Err(SourceError::StreamClosed),
            },
        }
    }
}

/// Build a notification for tests.
pub fn notification(channel: &str, key: &str) -> RawNotification {
    RawNotification {
        channel: channel.to_string(),
        key: key.to_string(),
    }
}
