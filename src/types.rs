//! Core types for the notification client.

use chrono::{SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Default number of records kept in the local history.
pub const DEFAULT_CAPACITY: usize = 50;

/// A notification as held in the local cache and the durable store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    /// Application-defined structured data, opaque to the client.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// ISO-8601 timestamp, either sent by the source or assigned on receipt.
    pub timestamp: String,
    #[serde(default)]
    pub read: bool,
}

/// Body of an inbound `notification` event.
///
/// `timestamp` and `read` are optional. A timestamp that is not a string
/// (epoch milliseconds) is converted; anything else unusable is treated as
/// absent. Fields other than the known ones are kept in the payload: they
/// become the payload when none is sent, and are merged into it otherwise.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct IncomingNotification {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub read: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl IncomingNotification {
    /// Build an incoming notification with a payload and no timestamp.
    pub fn new(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            payload: Some(payload),
            timestamp: None,
            read: false,
            extra: serde_json::Map::new(),
        }
    }

    /// Attach an explicit timestamp.
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    /// Turn into a cache record, stamping `received_at` if the source sent no timestamp.
    pub fn into_record(self, received_at: String) -> NotificationRecord {
        let payload = match (self.payload, self.extra) {
            (Some(payload), extra) if extra.is_empty() => payload,
            (Some(serde_json::Value::Object(mut fields)), extra) => {
                for (key, value) in extra {
                    fields.entry(key).or_insert(value);
                }
                serde_json::Value::Object(fields)
            }
            (Some(other), mut extra) => {
                extra.insert("payload".to_string(), other);
                serde_json::Value::Object(extra)
            }
            (None, extra) if !extra.is_empty() => serde_json::Value::Object(extra),
            (None, _) => serde_json::Value::Null,
        };

        NotificationRecord {
            id: self.id,
            payload,
            timestamp: self
                .timestamp
                .filter(|t| !t.is_empty())
                .unwrap_or(received_at),
            read: self.read,
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s),
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        _ => None,
    })
}

/// Current wall-clock time as an ISO-8601 string (UTC, millisecond precision).
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Events delivered to subscribers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationEvent {
    /// A record was added to the cache.
    Added { record: NotificationRecord },

    /// The cache changed as a whole (cleared, or read-state flipped).
    /// Subscribers should re-read the snapshot.
    Refresh,

    /// Connection retries were exhausted.
    ConnectionError { message: String },
}

impl NotificationEvent {
    /// The record carried by this event, if any.
    pub fn record(&self) -> Option<&NotificationRecord> {
        match self {
            NotificationEvent::Added { record } => Some(record),
            _ => None,
        }
    }
}

/// Lifecycle of the notification channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Retrying,
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Retrying => "retrying",
            ConnectionState::Failed => "failed",
        };
        f.write_str(name)
    }
}
