//! Connection manager and its driver task.

use crate::config::ClientConfig;
use crate::credentials::CredentialProvider;
use crate::error::{ClientError, Result, TransportError};
use crate::transport::{Channel, ConnectRequest, Connector};
use crate::types::ConnectionState;
use crate::wire::{InboundEvent, OutboundCommand};
use parking_lot::{Mutex, ReentrantMutex};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

/// Receives what arrives on the channel.
///
/// Called from the driver task. Implementations must not block; the next
/// inbound event is not read until the call returns.
pub trait ChannelHandler: Send + Sync {
    /// An inbound event, in transport delivery order.
    fn on_event(&self, event: InboundEvent);

    /// The sequence ended for good: retries were exhausted or the token went
    /// away. Called once, before the pending connect fails with `error`.
    fn on_connection_failed(&self, error: &ClientError);
}

/// Shared result of a connect sequence.
#[derive(Clone, Debug)]
enum Outcome {
    Connected,
    Failed {
        attempts: u32,
        last_error: TransportError,
    },
    MissingCredential,
    Aborted,
}

impl Outcome {
    fn into_result(self) -> Result<()> {
        match self {
            Outcome::Connected => Ok(()),
            Outcome::Failed {
                attempts,
                last_error,
            } => Err(ClientError::RetriesExhausted {
                attempts,
                last_error,
            }),
            Outcome::MissingCredential => Err(ClientError::AuthenticationMissing),
            Outcome::Aborted => Err(ClientError::Aborted),
        }
    }
}

type PendingTx = watch::Sender<Option<Outcome>>;

/// Mutable connection state. Every transition happens under this lock and
/// is checked against `generation`, which `connect()` and `disconnect()`
/// bump so a superseded driver can never touch a newer sequence.
struct Inner {
    generation: u64,
    state: ConnectionState,
    retry_count: u32,
    pending: Option<PendingTx>,
    session: Option<mpsc::UnboundedSender<OutboundCommand>>,
    driver: Option<JoinHandle<()>>,
}

enum AfterFailure {
    Retry { attempt: u32, delay: Duration },
    GiveUp { attempts: u32, pending: Option<PendingTx> },
    Stale,
}

struct Shared {
    config: ClientConfig,
    url: Url,
    connector: Arc<dyn Connector>,
    credentials: Arc<dyn CredentialProvider>,
    handler: Arc<dyn ChannelHandler>,
    inner: Mutex<Inner>,
    /// Held while the handler runs. Reentrant so a handler may disconnect.
    dispatch: ReentrantMutex<()>,
    state_tx: watch::Sender<ConnectionState>,
}

impl Shared {
    fn set_state(&self, inner: &mut Inner, state: ConnectionState) {
        if inner.state != state {
            debug!(from = %inner.state, to = %state, "connection state changed");
            inner.state = state;
            self.state_tx.send_replace(state);
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.lock().generation == generation
    }

    /// Run `f` on the handler if `generation` is still current. Returns
    /// false for a superseded sequence.
    ///
    /// `disconnect()` waits on the same gate, so once it returns nothing
    /// from the old sequence reaches the handler.
    fn dispatch(&self, generation: u64, f: impl FnOnce(&dyn ChannelHandler)) -> bool {
        let _gate = self.dispatch.lock();
        if !self.is_current(generation) {
            return false;
        }
        f(self.handler.as_ref());
        true
    }

    /// Broadcast a terminal failure, then resolve the pending connect.
    fn give_up(&self, generation: u64, pending: Option<PendingTx>, outcome: Outcome) {
        let delivered = match outcome.clone().into_result() {
            Err(error) => self.dispatch(generation, |handler| handler.on_connection_failed(&error)),
            Ok(()) => false,
        };
        if let Some(pending) = pending {
            pending.send_replace(Some(if delivered { outcome } else { Outcome::Aborted }));
        }
    }

    fn begin_attempt(&self, generation: u64) -> bool {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return false;
        }
        self.set_state(&mut inner, ConnectionState::Connecting);
        true
    }

    fn on_connected(&self, generation: u64, outbound: mpsc::UnboundedSender<OutboundCommand>) -> bool {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return false;
        }
        inner.retry_count = 0;
        inner.session = Some(outbound);
        self.set_state(&mut inner, ConnectionState::Connected);
        if let Some(pending) = inner.pending.take() {
            pending.send_replace(Some(Outcome::Connected));
        }
        true
    }

    fn on_attempt_failed(&self, generation: u64) -> AfterFailure {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return AfterFailure::Stale;
        }

        inner.retry_count += 1;
        let attempt = inner.retry_count;
        if attempt >= self.config.max_retries {
            self.set_state(&mut inner, ConnectionState::Failed);
            return AfterFailure::GiveUp {
                attempts: attempt,
                pending: inner.pending.take(),
            };
        }

        self.set_state(&mut inner, ConnectionState::Retrying);
        AfterFailure::Retry {
            attempt,
            delay: self.config.backoff(attempt),
        }
    }

    /// The source closed an established channel. Returns whether to reconnect.
    fn on_remote_close(&self, generation: u64) -> bool {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return false;
        }
        inner.session = None;

        if self.config.auto_reconnect {
            // New pending outcome so callers arriving now join the reconnect.
            let (pending, _) = watch::channel(None);
            inner.pending = Some(pending);
            self.set_state(&mut inner, ConnectionState::Retrying);
            true
        } else {
            inner.pending = None;
            self.set_state(&mut inner, ConnectionState::Disconnected);
            false
        }
    }

    fn on_credential_lost(&self, generation: u64) -> AfterFailure {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return AfterFailure::Stale;
        }
        self.set_state(&mut inner, ConnectionState::Failed);
        AfterFailure::GiveUp {
            attempts: inner.retry_count,
            pending: inner.pending.take(),
        }
    }
}

/// One connect sequence: handshake attempts with linear backoff, then the
/// inbound read loop, then (optionally) reconnection.
async fn drive(shared: Arc<Shared>, generation: u64, mut token: String) {
    loop {
        if !shared.begin_attempt(generation) {
            return;
        }

        let request = ConnectRequest {
            url: shared.url.clone(),
            token: token.clone(),
        };

        match shared.connector.connect(&request).await {
            Ok(Channel {
                outbound,
                mut inbound,
            }) => {
                if !shared.on_connected(generation, outbound) {
                    return;
                }
                info!(url = %shared.url, "connected to notification server");

                while let Some(event) = inbound.recv().await {
                    if !shared.dispatch(generation, |handler| handler.on_event(event)) {
                        return;
                    }
                }

                info!(url = %shared.url, "notification server closed the channel");
                if !shared.on_remote_close(generation) {
                    return;
                }
                tokio::time::sleep(shared.config.retry_delay()).await;
            }
            Err(e) => match shared.on_attempt_failed(generation) {
                AfterFailure::Stale => return,
                AfterFailure::GiveUp { attempts, pending } => {
                    error!(attempts, error = %e, "failed to connect to notification server");
                    shared.give_up(
                        generation,
                        pending,
                        Outcome::Failed {
                            attempts,
                            last_error: e,
                        },
                    );
                    return;
                }
                AfterFailure::Retry { attempt, delay } => {
                    warn!(
                        attempt,
                        max_retries = shared.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "connection attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            },
        }

        match shared.credentials.token() {
            Some(fresh) => token = fresh,
            None => {
                warn!("authentication token no longer available, giving up");
                if let AfterFailure::GiveUp { pending, .. } = shared.on_credential_lost(generation) {
                    shared.give_up(generation, pending, Outcome::MissingCredential);
                }
                return;
            }
        }
    }
}

/// Owns the channel to the notification source.
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    /// Create a manager. Nothing is opened until [`connect`](Self::connect).
    pub fn new(
        config: &ClientConfig,
        connector: Arc<dyn Connector>,
        credentials: Arc<dyn CredentialProvider>,
        handler: Arc<dyn ChannelHandler>,
    ) -> Result<Self> {
        config.validate()?;
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        Ok(Self {
            shared: Arc::new(Shared {
                url: config.endpoint_url()?,
                config: config.clone(),
                connector,
                credentials,
                handler,
                inner: Mutex::new(Inner {
                    generation: 0,
                    state: ConnectionState::Disconnected,
                    retry_count: 0,
                    pending: None,
                    session: None,
                    driver: None,
                }),
                dispatch: ReentrantMutex::new(()),
                state_tx,
            }),
        })
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().state
    }

    /// Observe state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Failed attempts in the current sequence.
    pub fn retry_count(&self) -> u32 {
        self.shared.inner.lock().retry_count
    }

    /// Connect, or join the connect already in progress.
    ///
    /// Resolves when the channel is up, or with the terminal error once
    /// retries are exhausted. Intermediate failures are retried silently.
    /// Returns immediately if already connected, and fails immediately with
    /// [`ClientError::AuthenticationMissing`] if no token is available.
    pub async fn connect(&self) -> Result<()> {
        let mut outcome = {
            let mut inner = self.shared.inner.lock();
            if inner.state == ConnectionState::Connected {
                return Ok(());
            }

            if let Some(pending) = &inner.pending {
                debug!("joining pending connect");
                pending.subscribe()
            } else {
                let token = self
                    .shared
                    .credentials
                    .token()
                    .ok_or(ClientError::AuthenticationMissing)?;

                inner.generation += 1;
                inner.retry_count = 0;
                let generation = inner.generation;

                let (pending, outcome) = watch::channel(None);
                inner.pending = Some(pending);
                if let Some(stale) = inner.driver.take() {
                    stale.abort();
                }
                self.shared.set_state(&mut inner, ConnectionState::Connecting);
                inner.driver = Some(tokio::spawn(drive(
                    Arc::clone(&self.shared),
                    generation,
                    token,
                )));
                outcome
            }
        };

        let resolved = outcome
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|outcome| (*outcome).clone())
            .unwrap_or(Outcome::Aborted);

        resolved.into_result()
    }

    /// Tear everything down. Safe in any state; never fails.
    ///
    /// A pending `connect()` resolves with [`ClientError::Aborted`]. Events
    /// already queued on the old channel are discarded.
    pub fn disconnect(&self) {
        let (previous, driver, pending, session) = {
            let mut inner = self.shared.inner.lock();
            inner.generation += 1;
            inner.retry_count = 0;
            let previous = inner.state;
            self.shared
                .set_state(&mut inner, ConnectionState::Disconnected);
            (
                previous,
                inner.driver.take(),
                inner.pending.take(),
                inner.session.take(),
            )
        };

        if let Some(driver) = driver {
            driver.abort();
        }
        drop(session);
        if let Some(pending) = pending {
            pending.send_replace(Some(Outcome::Aborted));
        }
        // Wait out a dispatch already running for the old generation.
        drop(self.shared.dispatch.lock());

        if previous != ConnectionState::Disconnected {
            info!(from = %previous, "disconnected from notification server");
        }
    }

    /// Queue a command on the live channel.
    pub fn send(&self, command: OutboundCommand) -> Result<()> {
        let inner = self.shared.inner.lock();
        match (&inner.session, inner.state) {
            (Some(session), ConnectionState::Connected) => session
                .send(command)
                .map_err(|_| ClientError::Transport(TransportError::Closed)),
            _ => Err(ClientError::NotConnected),
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        // The driver holds the shared state; stop it with us.
        self.disconnect();
    }
}
