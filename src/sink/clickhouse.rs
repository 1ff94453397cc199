//! ClickHouse sink implementation.
//!
//! Writes one row per event into `<instance>_updates` in the configured
//! database. Table provisioning is an operator concern; the sink assumes
//! the table exists and inserts in the fixed column order of
//! [`KeyEvent`](crate::event::KeyEvent).

use async_trait::async_trait;
use clickhouse::Client;
use tracing::{debug, info};

use super::{EventSink, Result, SinkError};
use crate::config::SinkConfig;
use crate::event::KeyEvent;

/// Suffix appended to the normalized instance name to form the table name.
const TABLE_SUFFIX: &str = "_updates";

/// ClickHouse-backed event sink.
pub struct ClickHouseSink {
    client: Client,
    table: String,
}

impl ClickHouseSink {
    /// Connect to ClickHouse and verify liveness.
    ///
    /// Fails fast when the endpoint is unreachable or the database is
    /// rejected, so a misconfigured sink stops the process at startup.
    pub async fn connect(config: &SinkConfig, instance: &str) -> Result<Self> {
        let client = Client::default()
            .with_url(&config.url)
            .with_database(&config.database);

        client
            .query("SELECT 1")
            .execute()
            .await
            .map_err(|e| SinkError::Connection(e.to_string()))?;

        let table = table_name(instance);

        info!(
            url = %config.url,
            database = %config.database,
            table = %table,
            "Connected to ClickHouse"
        );

        Ok(Self { client, table })
    }
}

/// Derive the target table name from the instance label.
///
/// Non-alphanumeric characters are normalized to `_` so the label is
/// safe to use as an identifier.
fn table_name(instance: &str) -> String {
    let safe: String = instance
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{safe}{TABLE_SUFFIX}")
}

#[async_trait]
impl EventSink for ClickHouseSink {
    async fn write(&self, event: &KeyEvent) -> Result<()> {
        let result: std::result::Result<(), clickhouse::error::Error> = async {
            let mut insert = self.client.insert(&self.table)?;
            insert.write(event).await?;
            insert.end().await
        }
        .await;

        result.map_err(|e| SinkError::Write(e.to_string()))?;

        debug!(operation = %event.operation, key = %event.key, "Event recorded");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // The HTTP client holds no state that needs releasing.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_plain() {
        assert_eq!(table_name("redis"), "redis_updates");
    }

    #[test]
    fn test_table_name_normalizes_separators() {
        assert_eq!(table_name("cache-prod"), "cache_prod_updates");
        assert_eq!(table_name("eu.west 1"), "eu_west_1_updates");
    }
}
