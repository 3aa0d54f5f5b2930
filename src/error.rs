//! Error types for the notification client.

use thiserror::Error;

/// Failures of the durable store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Invalid store format: {0}")]
    InvalidFormat(String),

    #[error("Invalid storage key: {0:?}")]
    InvalidKey(String),

    #[error("Store is locked by another process")]
    Locked,

    #[error("Store not initialized")]
    NotInitialized,
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_data() || e.is_syntax() || e.is_eof() {
            StorageError::Deserialization(e.to_string())
        } else {
            StorageError::Serialization(e.to_string())
        }
    }
}

impl From<rmp_serde::encode::Error> for StorageError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for StorageError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        StorageError::Deserialization(e.to_string())
    }
}

/// Channel-level failures. Cloneable so a single terminal failure can be
/// handed to every caller sharing a pending connect.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Handshake rejected: {0}")]
    Handshake(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Channel closed")]
    Closed,
}

/// Main error type for client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("No authentication token found")]
    AuthenticationMissing,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Failed to connect to notification service after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        attempts: u32,
        last_error: TransportError,
    },

    #[error("Connect aborted by disconnect")]
    Aborted,

    #[error("Not connected")]
    NotConnected,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// True for failures that come from the connection rather than the cache.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ClientError::AuthenticationMissing
                | ClientError::Transport(_)
                | ClientError::RetriesExhausted { .. }
                | ClientError::Aborted
                | ClientError::NotConnected
        )
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
