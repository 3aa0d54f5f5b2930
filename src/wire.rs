//! Wire format of the notification channel.
//!
//! Every frame is a JSON text message `{"event": <name>, "data": <payload>}`.
//! `data` is omitted for events without a payload.

use crate::error::TransportError;
use crate::types::IncomingNotification;
use serde::{Deserialize, Serialize};

/// Event name of an incoming notification.
pub const EVENT_NOTIFICATION: &str = "notification";

/// Event name of an authoritative clear from the source.
pub const EVENT_NOTIFICATIONS_CLEARED: &str = "notifications_cleared";

/// Events accepted from the source.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundEvent {
    Notification(IncomingNotification),
    NotificationsCleared,
}

#[derive(Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl InboundEvent {
    /// Decode a text frame. `Ok(None)` for well-formed frames naming an
    /// event this client does not handle.
    pub fn decode(text: &str) -> Result<Option<Self>, TransportError> {
        let frame: RawFrame = serde_json::from_str(text)
            .map_err(|e| TransportError::Protocol(format!("malformed frame: {}", e)))?;

        match frame.event.as_str() {
            EVENT_NOTIFICATION => {
                let incoming = serde_json::from_value(frame.data).map_err(|e| {
                    TransportError::Protocol(format!("malformed notification: {}", e))
                })?;
                Ok(Some(InboundEvent::Notification(incoming)))
            }
            EVENT_NOTIFICATIONS_CLEARED => Ok(Some(InboundEvent::NotificationsCleared)),
            _ => Ok(None),
        }
    }
}

/// Commands sent to the source. Best-effort, never acknowledged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutboundCommand {
    MarkAsRead {
        #[serde(rename = "notificationId")]
        notification_id: String,
    },
    MarkAllAsRead,
    ClearNotifications,
}

impl OutboundCommand {
    /// Wire event name.
    pub fn name(&self) -> &'static str {
        match self {
            OutboundCommand::MarkAsRead { .. } => "mark_as_read",
            OutboundCommand::MarkAllAsRead => "mark_all_as_read",
            OutboundCommand::ClearNotifications => "clear_notifications",
        }
    }

    /// Encode as a text frame.
    pub fn encode(&self) -> Result<String, TransportError> {
        serde_json::to_string(self).map_err(|e| TransportError::Protocol(e.to_string()))
    }
}
