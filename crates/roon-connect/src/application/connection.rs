//! ConnectionManager: the connection and authorization lifecycle for one Roon Core.
//!
//! # State machine
//!
//! ```text
//!                 begin_discovery()            discovery returns
//! Disconnected ───────────────────► Discovering ─────────────────► Disconnected
//!      │
//!      │ connect() / reconnect_from_saved()
//!      ▼
//! Connecting ──LinkEstablished──► Authenticating ──TokenGranted──► Connected
//!      │                               │                              │
//!      │ LinkFailed                    │ TokenDenied / timeout /      │ LinkLost /
//!      ▼                               ▼ LinkLost                     ▼ TokenDenied
//!    Error ◄───────────────────────────┴──────────────────────────────┘
//!
//! Error / Connected / any in-flight state ──disconnect()──► Disconnected
//! ```
//!
//! # Single writer
//!
//! Every transition goes through `&mut self`, so the borrow checker enforces
//! that exactly one transition runs at a time.  Transport events arrive on a
//! channel the manager owns; they are drained before any caller-initiated
//! transition so that network ground truth is always applied first.
//!
//! # Observer
//!
//! Each state change sends exactly one [`StatusUpdate`] on the unbounded
//! channel returned by [`ConnectionManager::new`], in transition order.

use std::fmt;
use std::time::{Duration, Instant};

use roon_core::{DescriptorError, ServerDescriptor};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, error, info, warn};

use super::ports::{
    CredentialStore, DiscoveryError, ServerDiscovery, SessionTransport, StoreError,
    TransportError, TransportEvent, TransportFactory,
};

/// Lifecycle state of the connection to a Roon Core.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Discovering,
    Connecting,
    Authenticating,
    Connected,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Discovering => "discovering",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Why an attempt ended in [`ConnectionState::Error`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("could not connect: {0}")]
    ConnectFailed(String),
    #[error("authorization was rejected by the core")]
    AuthRejected,
    #[error("authorization was not granted in time")]
    AuthTimeout,
    #[error("connection to the core was lost")]
    LinkLost,
}

/// Synchronous failures of a caller request.  None of them change state.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("invalid target: {0}")]
    InvalidTarget(#[from] DescriptorError),
    #[error("a connection attempt is already in progress")]
    AlreadyConnecting,
    #[error("already connected")]
    AlreadyConnected,
    #[error("disconnect before starting a new attempt (current state: {0})")]
    NotDisconnected(ConnectionState),
    #[error("discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Notification delivered to the observer on every state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub state: ConnectionState,
    pub last_error: Option<SessionError>,
}

impl StatusUpdate {
    /// `true` once the core has granted a token for this session.
    pub fn is_authenticated(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

/// Snapshot of the session owned by the manager.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionSession {
    pub state: ConnectionState,
    pub target: Option<ServerDescriptor>,
    pub token: Option<String>,
    pub last_error: Option<SessionError>,
}

/// Timing knobs for the state machine.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// How long to wait in `Authenticating` for the user to approve the extension.
    pub auth_timeout: Duration,
    /// Receive window for [`ConnectionManager::begin_discovery`].
    pub discovery_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            auth_timeout: Duration::from_secs(120),
            discovery_timeout: Duration::from_secs(5),
        }
    }
}

/// Transport plus the receiving half of its event channel.
///
/// A fresh channel per attempt means events from a released transport can
/// never reach a later attempt.
struct ActiveAttempt<T> {
    transport: T,
    events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Owns the [`ConnectionSession`] and drives every transition.
pub struct ConnectionManager<S, F: TransportFactory, D> {
    config: ConnectionConfig,
    session: ConnectionSession,
    store: S,
    factory: F,
    discovery: D,
    attempt: Option<ActiveAttempt<F::Transport>>,
    auth_deadline: Option<Instant>,
    status_tx: mpsc::UnboundedSender<StatusUpdate>,
}

impl<S, F, D> ConnectionManager<S, F, D>
where
    S: CredentialStore,
    F: TransportFactory,
    D: ServerDiscovery,
{
    /// Creates a manager in `Disconnected` and returns it with the status receiver.
    pub fn new(
        config: ConnectionConfig,
        store: S,
        factory: F,
        discovery: D,
    ) -> (Self, mpsc::UnboundedReceiver<StatusUpdate>) {
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let mgr = Self {
            config,
            session: ConnectionSession::default(),
            store,
            factory,
            discovery,
            attempt: None,
            auth_deadline: None,
            status_tx,
        };
        (mgr, status_rx)
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state
    }

    pub fn session(&self) -> &ConnectionSession {
        &self.session
    }

    pub fn target(&self) -> Option<&ServerDescriptor> {
        self.session.target.as_ref()
    }

    pub fn token(&self) -> Option<&str> {
        self.session.token.as_deref()
    }

    pub fn last_error(&self) -> Option<&SessionError> {
        self.session.last_error.as_ref()
    }

    /// Runs one discovery round and returns to `Disconnected`.
    ///
    /// Blocks for the configured discovery timeout; call it from a blocking
    /// worker when driving the manager from async code.
    ///
    /// # Errors
    ///
    /// Returns an "already" error when not idle, or
    /// [`ConnectionError::Discovery`] if the socket could not be opened.  In
    /// the latter case the state is still back to `Disconnected`.
    pub fn begin_discovery(&mut self) -> Result<Vec<ServerDescriptor>, ConnectionError> {
        self.process_pending();
        self.ensure_idle()?;

        self.transition(ConnectionState::Discovering);
        let result = self.discovery.discover(self.config.discovery_timeout);
        self.transition(ConnectionState::Disconnected);

        let servers = result?;
        info!(count = servers.len(), "discovery round finished");
        Ok(servers)
    }

    /// Starts connecting to `server`, reusing `saved_token` for silent reauthorization.
    ///
    /// Returns as soon as the transport is opened; progress is reported
    /// through transport events and [`StatusUpdate`]s.  A transport that
    /// cannot even be opened moves the session to `Error` with
    /// [`SessionError::ConnectFailed`].
    ///
    /// # Errors
    ///
    /// [`ConnectionError::AlreadyConnecting`], [`ConnectionError::AlreadyConnected`]
    /// or [`ConnectionError::NotDisconnected`] when an attempt exists, and
    /// [`ConnectionError::InvalidTarget`] for an unusable descriptor.
    pub fn connect(
        &mut self,
        server: ServerDescriptor,
        saved_token: Option<String>,
    ) -> Result<(), ConnectionError> {
        self.process_pending();
        self.ensure_idle()?;
        server.validate()?;

        info!(server = %server, reuse_token = saved_token.is_some(), "connecting");
        let host = server.host.clone();
        let port = server.port;
        self.session.target = Some(server);
        self.session.token = saved_token;
        self.session.last_error = None;
        self.transition(ConnectionState::Connecting);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        match self.factory.open(&host, port, events_tx) {
            Ok(transport) => {
                self.attempt = Some(ActiveAttempt {
                    transport,
                    events: events_rx,
                });
            }
            Err(e) => self.fail(SessionError::ConnectFailed(e.to_string())),
        }
        Ok(())
    }

    /// Connects to the server recorded in the credential store.
    ///
    /// Returns `Ok(false)` and stays `Disconnected` when nothing is saved.
    ///
    /// # Errors
    ///
    /// Same as [`ConnectionManager::connect`], plus [`ConnectionError::Store`]
    /// when the store cannot be read.
    pub fn reconnect_from_saved(&mut self) -> Result<bool, ConnectionError> {
        self.process_pending();
        self.ensure_idle()?;

        let Some(saved) = self.store.load_saved_server()? else {
            info!("no saved server to reconnect to");
            return Ok(false);
        };
        self.connect(saved.server, saved.token)?;
        Ok(true)
    }

    /// Abandons the current attempt or session from any state.
    ///
    /// The transport is closed and dropped before this returns.  A no-op in
    /// `Disconnected`.
    pub fn disconnect(&mut self) {
        self.process_pending();
        if self.session.state == ConnectionState::Disconnected {
            return;
        }

        info!(state = %self.session.state, "disconnecting");
        self.release_transport();
        self.session.target = None;
        self.session.token = None;
        self.session.last_error = None;
        self.transition(ConnectionState::Disconnected);
    }

    /// Applies every transport event already queued, then the auth deadline.
    ///
    /// Returns the number of events applied.
    pub fn process_pending(&mut self) -> usize {
        let mut applied = 0;
        loop {
            let Some(attempt) = self.attempt.as_mut() else {
                break;
            };
            let event = match attempt.events.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("transport event channel closed");
                    TransportEvent::LinkLost
                }
            };
            self.apply_transport_event(event);
            applied += 1;
        }
        self.check_auth_deadline(Instant::now());
        applied
    }

    /// Waits for the next transport event or the auth deadline and applies it.
    ///
    /// Returns `false` immediately when there is no active transport.
    pub async fn next_event(&mut self) -> bool {
        let deadline = self.auth_deadline;
        let Some(attempt) = self.attempt.as_mut() else {
            return false;
        };

        let received = match deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    event = attempt.events.recv() => Some(event),
                    _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => None,
                }
            }
            None => Some(attempt.events.recv().await),
        };

        match received {
            Some(Some(event)) => self.apply_transport_event(event),
            Some(None) => self.apply_transport_event(TransportEvent::LinkLost),
            None => self.expire_authentication(),
        }
        true
    }

    /// Fails the attempt with [`SessionError::AuthTimeout`] if `now` is past
    /// the auth deadline.  Returns `true` if it did.
    pub fn check_auth_deadline(&mut self, now: Instant) -> bool {
        match self.auth_deadline {
            Some(deadline) if now >= deadline => {
                self.expire_authentication();
                true
            }
            _ => false,
        }
    }

    // ── Transitions ──────────────────────────────────────────────────────────

    fn ensure_idle(&self) -> Result<(), ConnectionError> {
        match self.session.state {
            ConnectionState::Disconnected => Ok(()),
            ConnectionState::Discovering
            | ConnectionState::Connecting
            | ConnectionState::Authenticating => Err(ConnectionError::AlreadyConnecting),
            ConnectionState::Connected => Err(ConnectionError::AlreadyConnected),
            ConnectionState::Error => Err(ConnectionError::NotDisconnected(ConnectionState::Error)),
        }
    }

    fn apply_transport_event(&mut self, event: TransportEvent) {
        use ConnectionState as St;
        use TransportEvent as Ev;

        match (self.session.state, event) {
            (St::Connecting, Ev::LinkEstablished) => self.start_authentication(),
            (St::Connecting, Ev::LinkFailed(reason)) => {
                self.fail(SessionError::ConnectFailed(reason));
            }
            (St::Connecting, Ev::LinkLost) => {
                self.fail(SessionError::ConnectFailed(
                    "link closed before it was established".to_string(),
                ));
            }
            (St::Authenticating, Ev::TokenGranted(token)) => self.complete_authentication(token),
            (St::Authenticating, Ev::TokenDenied) => {
                if let Some(target) = &self.session.target {
                    if let Err(e) = self.store.clear_token(&target.unique_id) {
                        error!("failed to clear token for {}: {e}", target.unique_id);
                    }
                }
                self.session.token = None;
                self.fail(SessionError::AuthRejected);
            }
            (St::Connected, Ev::TokenDenied) => {
                // Revoked after approval.  The stored token is only cleared by a
                // denial during authorization, so a reconnect retries it once.
                self.fail(SessionError::AuthRejected);
            }
            (St::Authenticating | St::Connected, Ev::LinkLost | Ev::LinkFailed(_)) => {
                self.fail(SessionError::LinkLost);
            }
            (state, event) => debug!(%state, ?event, "ignoring transport event"),
        }
    }

    fn start_authentication(&mut self) {
        self.transition(ConnectionState::Authenticating);
        self.auth_deadline = Some(Instant::now() + self.config.auth_timeout);

        let token = self.session.token.clone();
        let sent = match self.attempt.as_mut() {
            Some(attempt) => attempt.transport.send_auth_request(token.as_deref()),
            None => Err(TransportError::Closed),
        };
        match sent {
            Ok(()) if token.is_some() => debug!("silent reauthorization requested"),
            Ok(()) => info!("waiting for the extension to be enabled on the core"),
            Err(e) => self.fail(SessionError::ConnectFailed(e.to_string())),
        }
    }

    fn complete_authentication(&mut self, token: String) {
        self.auth_deadline = None;
        if let Some(target) = &self.session.target {
            if let Err(e) = self.store.save_server(target, &token) {
                error!("failed to persist token for {}: {e}", target.unique_id);
            }
        }
        self.session.token = Some(token);
        self.transition(ConnectionState::Connected);
    }

    fn expire_authentication(&mut self) {
        if self.session.state == ConnectionState::Authenticating {
            // The saved token stays: the user may simply not have approved yet.
            self.fail(SessionError::AuthTimeout);
        }
    }

    fn fail(&mut self, error: SessionError) {
        warn!(%error, "connection attempt failed");
        self.release_transport();
        self.session.last_error = Some(error);
        self.transition(ConnectionState::Error);
    }

    fn transition(&mut self, to: ConnectionState) {
        let from = self.session.state;
        self.session.state = to;
        info!(%from, %to, "connection state changed");

        let update = StatusUpdate {
            state: to,
            last_error: self.session.last_error.clone(),
        };
        if self.status_tx.send(update).is_err() {
            debug!("status observer dropped; update discarded");
        }
    }
}

impl<S, F: TransportFactory, D> ConnectionManager<S, F, D> {
    fn release_transport(&mut self) {
        self.auth_deadline = None;
        if let Some(mut attempt) = self.attempt.take() {
            attempt.transport.close();
            debug!("transport released");
        }
    }
}

impl<S, F: TransportFactory, D> Drop for ConnectionManager<S, F, D> {
    fn drop(&mut self) {
        self.release_transport();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
