//! In-process connector with a scripted source.
//!
//! Each accepted handshake produces a [`ServerSession`]: the source's end of
//! the channel. Tests push events through it and read the commands the
//! client sent.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify, Semaphore};

use super::{Channel, ConnectRequest, Connector};
use crate::error::TransportError;
use crate::types::IncomingNotification;
use crate::wire::{InboundEvent, OutboundCommand};

#[derive(Clone, Debug)]
enum Outcome {
    Accept,
    Fail(TransportError),
}

/// Holds handshakes open until released.
#[derive(Clone)]
pub struct Gate(Arc<Semaphore>);

impl Gate {
    /// Let every held and future handshake proceed.
    pub fn release(&self) {
        self.0.close();
    }
}

/// Scripted connector. Without a script every handshake is accepted.
pub struct MemoryConnector {
    script: Mutex<VecDeque<Outcome>>,
    fallback: Mutex<Outcome>,
    gate: Mutex<Option<Gate>>,
    attempts: AtomicU32,
    tokens: Mutex<Vec<String>>,
    sessions: Mutex<VecDeque<ServerSession>>,
    session_ready: Notify,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Outcome::Accept),
            gate: Mutex::new(None),
            attempts: AtomicU32::new(0),
            tokens: Mutex::new(Vec::new()),
            sessions: Mutex::new(VecDeque::new()),
            session_ready: Notify::new(),
        }
    }

    /// Fail the next `count` handshakes with `error`.
    pub fn fail_next(&self, count: usize, error: TransportError) {
        let mut script = self.script.lock();
        for _ in 0..count {
            script.push_back(Outcome::Fail(error.clone()));
        }
    }

    /// Fail every unscripted handshake with `error`.
    pub fn fail_always(&self, error: TransportError) {
        *self.fallback.lock() = Outcome::Fail(error);
    }

    /// Accept every unscripted handshake.
    pub fn accept_always(&self) {
        *self.fallback.lock() = Outcome::Accept;
    }

    /// Hold handshakes open until the returned gate is released.
    pub fn hold(&self) -> Gate {
        let gate = Gate(Arc::new(Semaphore::new(0)));
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    /// Handshakes started so far.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Tokens presented, in attempt order.
    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().clone()
    }

    /// Take the oldest accepted session not yet taken.
    pub fn take_session(&self) -> Option<ServerSession> {
        self.sessions.lock().pop_front()
    }

    /// Wait for the next accepted session.
    pub async fn next_session(&self) -> ServerSession {
        loop {
            if let Some(session) = self.take_session() {
                return session;
            }
            self.session_ready.notified().await;
        }
    }
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, request: &ConnectRequest) -> Result<Channel, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.tokens.lock().push(request.token.clone());

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            // Closed semaphore means released.
            let _ = gate.0.acquire().await;
        }

        let outcome = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.lock().clone());

        match outcome {
            Outcome::Fail(error) => Err(error),
            Outcome::Accept => {
                let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

                self.sessions.lock().push_back(ServerSession {
                    token: request.token.clone(),
                    events: inbound_tx,
                    commands: outbound_rx,
                });
                self.session_ready.notify_one();

                Ok(Channel {
                    outbound: outbound_tx,
                    inbound: inbound_rx,
                })
            }
        }
    }
}

/// The source's end of an accepted channel. Dropping it closes the channel.
pub struct ServerSession {
    pub token: String,
    events: mpsc::UnboundedSender<InboundEvent>,
    commands: mpsc::UnboundedReceiver<OutboundCommand>,
}

impl ServerSession {
    /// Deliver an event. Returns false if the client side is gone.
    pub fn push(&self, event: InboundEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Deliver a `notification` event.
    pub fn notify(&self, incoming: IncomingNotification) -> bool {
        self.push(InboundEvent::Notification(incoming))
    }

    /// Deliver a `notifications_cleared` event.
    pub fn clear(&self) -> bool {
        self.push(InboundEvent::NotificationsCleared)
    }

    /// Next command from the client; `None` once the client dropped the channel.
    pub async fn recv_command(&mut self) -> Option<OutboundCommand> {
        self.commands.recv().await
    }

    /// A command already queued by the client, without waiting.
    pub fn try_recv_command(&mut self) -> Option<OutboundCommand> {
        self.commands.try_recv().ok()
    }

    /// Whether the client still holds its end.
    pub fn is_open(&self) -> bool {
        !self.events.is_closed()
    }

    /// Close from the source side.
    pub fn close(self) {}
}
