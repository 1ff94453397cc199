//! Key-event data model.
//!
//! A `KeyEvent` is the unit handed to the sink: one keyspace notification
//! enriched with the value and TTL observed at capture time. The observed
//! state may be newer than the mutation that triggered the notification;
//! that race is inherent to read-after-notify enrichment.

use chrono::{DateTime, Utc};
use clickhouse::Row;
use serde::Serialize;

/// Maximum stored value length in bytes. Longer values are cut and marked.
pub const MAX_VALUE_LEN: usize = 1024;

/// Marker appended to values cut at [`MAX_VALUE_LEN`].
pub const TRUNCATION_MARKER: &str = "... (truncated)";

/// Operation recorded for channel names that do not parse.
pub const UNKNOWN_OPERATION: &str = "UNKNOWN";

/// A raw keyspace notification as received from the pub/sub channel.
#[derive(Debug, Clone)]
pub struct RawNotification {
    /// Channel the message arrived on (e.g. `__keyevent@0__:set`).
    pub channel: String,
    /// The affected key.
    pub key: String,
}

/// One recorded key mutation.
///
/// Field order matches the sink table columns and must not change.
#[derive(Debug, Clone, PartialEq, Row, Serialize)]
pub struct KeyEvent {
    /// Capture time, assigned at enrichment.
    #[serde(with = "clickhouse::serde::chrono::datetime")]
    pub timestamp: DateTime<Utc>,
    /// Which Redis deployment produced the event.
    #[serde(rename = "redis_instance")]
    pub instance: String,
    /// Upper-cased operation name from the channel (SET, DEL, EXPIRE, ...).
    pub operation: String,
    /// The affected key.
    pub key: String,
    /// Value observed after the mutation; empty if the key was already gone.
    pub value: String,
    /// Remaining TTL in whole seconds; `None` when the key has no expiry.
    pub ttl: Option<u32>,
    /// Reserved for hash-field operations.
    pub field: Option<String>,
    /// Reserved for client attribution.
    pub client_info: Option<String>,
}

/// Extract the operation name from a key-event channel name.
///
/// Channels look like `__keyevent@0__:set`; the operation is the segment
/// after the last `:`, upper-cased. Names without a separator map to
/// [`UNKNOWN_OPERATION`].
pub fn operation_from_channel(channel: &str) -> String {
    match channel.rsplit_once(':') {
        Some((_, operation)) => operation.to_uppercase(),
        None => UNKNOWN_OPERATION.to_string(),
    }
}

/// Cap `value` at [`MAX_VALUE_LEN`] bytes, appending the truncation marker.
///
/// The cut point backs up to a UTF-8 boundary so the result stays valid.
pub fn truncate_value(value: &mut String) {
    if value.len() <= MAX_VALUE_LEN {
        return;
    }
    let mut cut = MAX_VALUE_LEN;
    while !value.is_char_boundary(cut) {
        cut -= 1;
    }
    value.truncate(cut);
    value.push_str(TRUNCATION_MARKER);
}
