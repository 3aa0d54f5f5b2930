//! Client configuration.

use crate::error::{ClientError, Result};
use crate::types::DEFAULT_CAPACITY;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Default storage key for the notification history.
pub const DEFAULT_STORAGE_KEY: &str = "notifications";

/// Configuration of a [`NotificationClient`](crate::NotificationClient).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket endpoint of the notification source. A bare `host:port/path`
    /// gets `ws://` or `wss://` depending on `secure`.
    pub endpoint: String,

    /// Require TLS (`wss`).
    pub secure: bool,

    /// Consecutive failed attempts before the connection is declared failed.
    pub max_retries: u32,

    /// Base retry delay in milliseconds. Attempt `n` waits `n * retry_delay_ms`.
    pub retry_delay_ms: u64,

    /// Maximum records kept in the local history.
    pub capacity: usize,

    /// Key under which the history is persisted.
    pub storage_key: String,

    /// Invoke the alert hook for each incoming notification.
    pub play_sound: bool,

    /// Re-enter the retry loop when the source closes an established channel.
    pub auto_reconnect: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::development()
    }
}

impl ClientConfig {
    /// Local development: plain `ws`, 3 retries, 2 s base delay.
    pub fn development() -> Self {
        Self {
            endpoint: "ws://localhost:8000/notifications".to_string(),
            secure: false,
            max_retries: 3,
            retry_delay_ms: 2000,
            capacity: DEFAULT_CAPACITY,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            play_sound: false,
            auto_reconnect: true,
        }
    }

    /// Production: TLS required, 5 retries, 3 s base delay.
    pub fn production(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            secure: true,
            max_retries: 5,
            retry_delay_ms: 3000,
            ..Self::development()
        }
    }

    /// Build from `HERALD_*` environment variables.
    ///
    /// `HERALD_MODE=production` selects the production profile; the other
    /// variables (`HERALD_SOCKET_URL`, `HERALD_ENABLE_SOUND`,
    /// `HERALD_MAX_RETRIES`, `HERALD_RETRY_DELAY_MS`) override single fields.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let production = lookup("HERALD_MODE").as_deref() == Some("production");
        let mut config = if production {
            let endpoint = lookup("HERALD_SOCKET_URL").ok_or_else(|| {
                ClientError::Config("HERALD_SOCKET_URL is required in production".into())
            })?;
            Self::production(endpoint)
        } else {
            Self::development()
        };

        if let Some(endpoint) = lookup("HERALD_SOCKET_URL") {
            config.endpoint = endpoint;
        }
        if let Some(flag) = lookup("HERALD_ENABLE_SOUND") {
            config.play_sound = flag == "true";
        }
        if let Some(value) = lookup("HERALD_MAX_RETRIES") {
            config.max_retries = value
                .parse()
                .map_err(|_| ClientError::Config(format!("HERALD_MAX_RETRIES: {:?}", value)))?;
        }
        if let Some(value) = lookup("HERALD_RETRY_DELAY_MS") {
            config.retry_delay_ms = value.parse().map_err(|_| {
                ClientError::Config(format!("HERALD_RETRY_DELAY_MS: {:?}", value))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check invariants that would otherwise surface as odd runtime behavior.
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(ClientError::Config("max_retries must be at least 1".into()));
        }
        if self.capacity == 0 {
            return Err(ClientError::Config("capacity must be at least 1".into()));
        }
        if self.storage_key.is_empty() {
            return Err(ClientError::Config("storage_key must not be empty".into()));
        }
        self.endpoint_url()?;
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Delay before retry number `attempt` (1-based). Linear in the attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.retry_delay() * attempt
    }

    /// Resolve the endpoint into a `ws`/`wss` URL honoring `secure`.
    pub fn endpoint_url(&self) -> Result<Url> {
        let raw = if self.endpoint.contains("://") {
            self.endpoint.clone()
        } else if self.secure {
            format!("wss://{}", self.endpoint)
        } else {
            format!("ws://{}", self.endpoint)
        };

        let mut url = Url::parse(&raw)
            .map_err(|e| ClientError::Config(format!("invalid endpoint {:?}: {}", raw, e)))?;

        let scheme = match url.scheme() {
            "ws" | "http" => "ws",
            "wss" | "https" => "wss",
            other => {
                return Err(ClientError::Config(format!(
                    "unsupported endpoint scheme: {}",
                    other
                )))
            }
        };
        if self.secure && scheme != "wss" {
            return Err(ClientError::Config(
                "secure mode requires a wss:// endpoint".into(),
            ));
        }
        if url.scheme() != scheme {
            url.set_scheme(scheme)
                .map_err(|_| ClientError::Config(format!("cannot use scheme {}", scheme)))?;
        }

        Ok(url)
    }
}
