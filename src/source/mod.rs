//! Redis notification source.
//!
//! Owns the pattern subscription to key-event channels and the connection
//! used for best-effort enrichment reads. The subscription runs on a
//! dedicated pub/sub connection; enrichment reads go through a
//! `ConnectionManager` so they multiplex with reconnect handling.

pub mod mock;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, ConnectionInfo, IntoConnectionInfo};
use tracing::{debug, info, warn};

use crate::config::SourceConfig;
use crate::event::RawNotification;

/// Pattern matching key-event notifications across all logical databases.
pub const KEYEVENT_PATTERN: &str = "__keyevent@*__:*";

/// Result type for source operations.
pub type Result<T> = std::result::Result<T, SourceError>;

/// Errors that can occur on the notification source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Notification stream closed")]
    StreamClosed,
}

/// A live sequence of keyspace notifications.
#[async_trait]
pub trait Notifications: Send {
    /// Receive the next notification.
    ///
    /// Suspends until a message arrives. Returns `Ok(None)` after a
    /// graceful close and `Err(SourceError::StreamClosed)` when the
    /// underlying connection is lost.
    async fn recv(&mut self) -> Result<Option<RawNotification>>;
}

/// Best-effort reads of a key's current state for enrichment.
///
/// A missing key and a failed read are deliberately indistinguishable:
/// both resolve to `None` and processing continues. The pipeline counts
/// these outcomes instead of raising them.
#[async_trait]
pub trait KeyReader: Send + Sync {
    /// Current value of `key`, if it still exists and is readable.
    async fn read_value(&self, key: &str) -> Option<String>;

    /// Remaining TTL of `key` in whole seconds, if it has one.
    async fn read_ttl(&self, key: &str) -> Option<u32>;
}

/// Redis notification source.
///
/// Construction verifies liveness with a PING round-trip so a bad
/// address or rejected credential fails at startup, not on first use.
pub struct RedisSource {
    client: Client,
    conn: ConnectionManager,
}

impl RedisSource {
    /// Connect to Redis and verify the connection.
    pub async fn connect(config: &SourceConfig) -> Result<Self> {
        let info = connection_info(config)?;
        let client = Client::open(info).map_err(|e| SourceError::Connection(e.to_string()))?;
        let mut conn = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| SourceError::Connection(e.to_string()))?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| SourceError::Connection(e.to_string()))?;

        info!(url = %config.url, db = config.db, "Connected to Redis");

        Ok(Self { client, conn })
    }

    /// Open a dedicated pub/sub connection subscribed to all key-event
    /// channels.
    pub async fn subscribe(&self) -> Result<NotificationStream> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| SourceError::Connection(e.to_string()))?;

        pubsub
            .psubscribe(KEYEVENT_PATTERN)
            .await
            .map_err(|e| SourceError::Subscribe(e.to_string()))?;

        info!(pattern = KEYEVENT_PATTERN, "Subscribed to keyspace events");

        Ok(NotificationStream {
            pubsub: Some(pubsub),
        })
    }
}

/// Build connection parameters from configuration.
///
/// The URL carries the address; database index and password from the
/// configuration override whatever the URL encodes.
fn connection_info(config: &SourceConfig) -> Result<ConnectionInfo> {
    let mut info = config
        .url
        .as_str()
        .into_connection_info()
        .map_err(|e| SourceError::Connection(e.to_string()))?;

    info.redis.db = config.db;
    if let Some(password) = &config.password {
        info.redis.password = Some(password.clone());
    }

    Ok(info)
}

#[async_trait]
impl KeyReader for RedisSource {
    async fn read_value(&self, key: &str) -> Option<String> {
        let mut conn = self.conn.clone();
        match conn.get::<_, Option<String>>(key).await {
            Ok(value) => value,
            Err(e) => {
                debug!(key = %key, error = %e, "Value read failed");
                None
            }
        }
    }

    async fn read_ttl(&self, key: &str) -> Option<u32> {
        let mut conn = self.conn.clone();
        match conn.ttl::<_, i64>(key).await {
            // -1 means no expiry, -2 means the key is gone
            Ok(seconds) if seconds > 0 => Some(seconds as u32),
            Ok(_) => None,
            Err(e) => {
                debug!(key = %key, error = %e, "TTL read failed");
                None
            }
        }
    }
}

/// Infinite stream of raw notifications from the pattern subscription.
pub struct NotificationStream {
    pubsub: Option<redis::aio::PubSub>,
}

impl NotificationStream {
    /// Release the subscription and its connection. Idempotent.
    pub async fn close(&mut self) {
        if let Some(mut pubsub) = self.pubsub.take() {
            if let Err(e) = pubsub.punsubscribe(KEYEVENT_PATTERN).await {
                warn!(error = %e, "Punsubscribe failed during close");
            }
        }
    }
}

#[async_trait]
impl Notifications for NotificationStream {
    async fn recv(&mut self) -> Result<Option<RawNotification>> {
        let Some(pubsub) = self.pubsub.as_mut() else {
            return Ok(None);
        };

        loop {
            let Some(msg) = pubsub.on_message().next().await else {
                return Err(SourceError::StreamClosed);
            };

            let channel = msg.get_channel_name().to_string();
            match msg.get_payload::<String>() {
                Ok(key) => return Ok(Some(RawNotification { channel, key })),
                Err(e) => {
                    // Spurious or undecodable payloads are skipped, not fatal.
                    debug!(channel = %channel, error = %e, "Skipping undecodable message");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_info_overrides() {
        let config = SourceConfig {
            url: "redis://localhost:6379".to_string(),
            password: Some("hunter2".to_string()),
            db: 3,
        };

        let info = connection_info(&config).unwrap();
        assert_eq!(info.redis.db, 3);
        assert_eq!(info.redis.password.as_deref(), Some("hunter2"));
    }

    #[test]
    fn test_connection_info_defaults() {
        let config = SourceConfig::default();
        let info = connection_info(&config).unwrap();
        assert_eq!(info.redis.db, 0);
        assert!(info.redis.password.is_none());
    }

    #[test]
    fn test_connection_info_rejects_bad_url() {
        let config = SourceConfig {
            url: "not a url".to_string(),
            ..SourceConfig::default()
        };
        assert!(matches!(
            connection_info(&config),
            Err(SourceError::Connection(_))
        ));
    }

    // Integration tests require Redis running
    // Run with: cargo test -- --ignored

    #[tokio::test]
    #[ignore]
    async fn test_read_missing_key() {
        let source = RedisSource::connect(&SourceConfig::default())
            .await
            .expect("Failed to connect to Redis");

        let key = "keywatch:test:does-not-exist";
        assert_eq!(source.read_value(key).await, None);
        assert_eq!(source.read_ttl(key).await, None);
    }
}
