//! WebSocket connector built on tokio-tungstenite.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use super::{Channel, ConnectRequest, Connector};
use crate::error::TransportError;
use crate::wire::{InboundEvent, OutboundCommand};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Connector that opens a WebSocket and presents the token as
/// `Authorization: Bearer <token>`.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Connector for WsConnector {
    async fn connect(&self, request: &ConnectRequest) -> Result<Channel, TransportError> {
        let mut ws_request = request
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;

        let bearer = HeaderValue::from_str(&format!("Bearer {}", request.token))
            .map_err(|_| TransportError::Handshake("token is not a valid header value".into()))?;
        ws_request.headers_mut().insert(AUTHORIZATION, bearer);

        let (ws, _response) = connect_async(ws_request).await.map_err(map_connect_error)?;
        debug!(url = %request.url, "websocket handshake complete");

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump(ws, outbound_rx, inbound_tx));

        Ok(Channel {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

fn map_connect_error(error: tungstenite::Error) -> TransportError {
    match error {
        tungstenite::Error::Http(response) => {
            TransportError::Handshake(format!("server responded {}", response.status()))
        }
        tungstenite::Error::Url(e) => TransportError::InvalidEndpoint(e.to_string()),
        other => TransportError::ConnectionFailed(other.to_string()),
    }
}

/// Moves frames between the socket and the channel queues until either side
/// goes away.
async fn pump(
    ws: WsStream,
    mut outbound: mpsc::UnboundedReceiver<OutboundCommand>,
    inbound: mpsc::UnboundedSender<InboundEvent>,
) {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            command = outbound.recv() => {
                let Some(command) = command else {
                    // Client dropped the channel: close politely.
                    let _ = sink.close().await;
                    break;
                };
                let text = match command.encode() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(command = command.name(), error = %e, "failed to encode command");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    warn!(command = command.name(), error = %e, "failed to send command");
                    break;
                }
            }

            message = stream.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => match InboundEvent::decode(text.as_str()) {
                        Ok(Some(event)) => {
                            if inbound.send(event).is_err() {
                                break;
                            }
                        }
                        Ok(None) => debug!("ignoring unknown event"),
                        Err(e) => warn!(error = %e, "dropping undecodable frame"),
                    },
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "server closed the channel");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "websocket read failed");
                        break;
                    }
                    None => break,
                }
            }

            _ = inbound.closed() => {
                let _ = sink.close().await;
                break;
            }
        }
    }
}
