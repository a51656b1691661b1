//! Collaborator interfaces consumed by the connection state machine.
//!
//! The application layer only sees these traits.  Production implementations
//! live in `infrastructure` (file-backed credential store, SOOD discovery);
//! tests use the in-crate mocks or `mockall`.

use std::net::SocketAddr;
use std::time::Duration;

use roon_core::ServerDescriptor;
use thiserror::Error;
use tokio::sync::mpsc;

// ── Credential store ──────────────────────────────────────────────────────────

/// Error reported by a [`CredentialStore`].
#[derive(Debug, Error)]
#[error("credential store error: {0}")]
pub struct StoreError(pub String);

/// The last server the user connected to, as persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedServer {
    pub server: ServerDescriptor,
    /// `None` after an explicit denial cleared it.
    pub token: Option<String>,
}

/// Persistence for the saved server and its authorization token.
pub trait CredentialStore: Send {
    /// Returns the saved server, or `None` if nothing usable is stored.
    fn load_saved_server(&self) -> Result<Option<SavedServer>, StoreError>;
    /// Records `server` as the saved server together with `token`.
    fn save_server(&mut self, server: &ServerDescriptor, token: &str) -> Result<(), StoreError>;
    /// Drops the stored token if it belongs to `unique_id`.
    fn clear_token(&mut self, unique_id: &str) -> Result<(), StoreError>;
}

// ── Session transport ─────────────────────────────────────────────────────────

/// Error reported by a transport when it cannot be opened or written to.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("could not reach {endpoint}: {reason}")]
    Unreachable { endpoint: String, reason: String },
    #[error("transport already closed")]
    Closed,
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Asynchronous notifications raised by a transport toward the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    LinkEstablished,
    LinkFailed(String),
    TokenGranted(String),
    TokenDenied,
    LinkLost,
}

/// Sending half handed to a transport when it is opened.
pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;

/// An open session toward one server.  Dropping it must release its resources.
pub trait SessionTransport: Send {
    /// Starts authorization, reusing `saved_token` when present.
    fn send_auth_request(&mut self, saved_token: Option<&str>) -> Result<(), TransportError>;
    /// Tears the session down.  Called once before the handle is dropped.
    fn close(&mut self);
}

/// Creates transports.  `open` must not block on the network: the outcome is
/// reported later through `events`.
pub trait TransportFactory: Send {
    type Transport: SessionTransport;

    fn open(
        &mut self,
        host: &str,
        port: u16,
        events: TransportEventSender,
    ) -> Result<Self::Transport, TransportError>;
}

// ── Discovery ─────────────────────────────────────────────────────────────────

/// Error type for a discovery round.  Only socket setup can fail; an empty
/// network is an empty result, not an error.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The UDP socket could not be bound.
    #[error("failed to bind discovery socket on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// A socket option (broadcast, TTL, timeout) could not be applied.
    #[error("failed to configure discovery socket: {0}")]
    SocketSetup(#[source] std::io::Error),
}

/// One bounded discovery round.
#[cfg_attr(test, mockall::automock)]
pub trait ServerDiscovery: Send {
    fn discover(&self, timeout: Duration) -> Result<Vec<ServerDescriptor>, DiscoveryError>;
}
