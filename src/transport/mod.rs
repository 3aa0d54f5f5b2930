//! Duplex channel to the notification source.
//!
//! A [`Connector`] performs the authenticated handshake and hands back a
//! [`Channel`]: a pair of queues decoupled from the socket. The connector
//! owns whatever task pumps the socket; the channel closes when that task
//! ends, and dropping the channel's halves tears the socket down.
//!
//! - [`WsConnector`]: WebSocket via tokio-tungstenite
//! - [`MemoryConnector`]: scripted in-process source for tests

mod memory;
mod ws;

pub use memory::{Gate, MemoryConnector, ServerSession};
pub use ws::WsConnector;

use crate::error::TransportError;
use crate::wire::{InboundEvent, OutboundCommand};
use tokio::sync::mpsc;
use url::Url;

/// Parameters of one handshake attempt.
#[derive(Clone, Debug)]
pub struct ConnectRequest {
    pub url: Url,
    /// Bearer token presented during the handshake.
    pub token: String,
}

/// An established channel.
pub struct Channel {
    /// Commands queued here are written to the source in order.
    pub outbound: mpsc::UnboundedSender<OutboundCommand>,
    /// Events from the source, in delivery order. Yields `None` once the
    /// source closes the channel.
    pub inbound: mpsc::UnboundedReceiver<InboundEvent>,
}

/// Opens channels to the notification source.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, request: &ConnectRequest) -> Result<Channel, TransportError>;
}
