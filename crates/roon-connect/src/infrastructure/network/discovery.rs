//! SOOD discovery engine.
//!
//! One discovery round:
//!
//! 1. Binds a UDP socket to an ephemeral port, enables broadcast and sets the
//!    multicast TTL.
//! 2. Sends one `Query` datagram to the SOOD multicast group and one to the
//!    LAN broadcast address.
//! 3. Collects `Response` datagrams until the deadline, normalising each into
//!    a [`ServerDescriptor`] and keeping the first copy per `unique_id`.
//!
//! The round is synchronous and blocks for the full timeout.  Async callers
//! run it on a blocking worker (`tokio::task::spawn_blocking`).
//!
//! # Read timeout
//!
//! Before every `recv_from` the socket read timeout is shrunk to the time left
//! until the deadline, so the round never overruns it by more than one
//! scheduling tick.  Timeout errors are treated as loop ticks.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::{Duration, Instant};

use roon_core::protocol::{
    codec::{decode_message, encode_query, has_sood_magic},
    messages::{DiscoveryQuery, SoodMessage, SOOD_PORT},
};
use roon_core::ServerDescriptor;
use tracing::{debug, info, trace, warn};

use crate::application::ports::{DiscoveryError, ServerDiscovery};

/// Receive buffer size: one Ethernet MTU.
const RECV_BUFFER_SIZE: usize = 1500;

/// Shortest read timeout handed to the OS; a zero timeout is rejected.
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Socket and timing parameters for one discovery round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoverySettings {
    /// Multicast group the query is sent to.
    pub multicast_target: SocketAddr,
    /// Broadcast address the query is sent to.
    pub broadcast_target: SocketAddr,
    /// Local address to bind; the port is always ephemeral.
    pub bind_address: IpAddr,
    /// IPv4 multicast TTL.  `1` keeps the query on the local segment.
    pub multicast_ttl: u32,
    /// How long to collect responses.
    pub timeout: Duration,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            multicast_target: SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::new(239, 255, 90, 90),
                SOOD_PORT,
            )),
            broadcast_target: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::BROADCAST, SOOD_PORT)),
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            multicast_ttl: 1,
            timeout: Duration::from_secs(5),
        }
    }
}

/// [`ServerDiscovery`] backed by a real UDP socket.
#[derive(Debug, Clone, Default)]
pub struct SoodDiscovery {
    settings: DiscoverySettings,
}

impl SoodDiscovery {
    pub fn new(settings: DiscoverySettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &DiscoverySettings {
        &self.settings
    }
}

impl ServerDiscovery for SoodDiscovery {
    /// Runs one round with the stored settings, overriding the timeout.
    fn discover(&self, timeout: Duration) -> Result<Vec<ServerDescriptor>, DiscoveryError> {
        let settings = DiscoverySettings {
            timeout,
            ..self.settings.clone()
        };
        discover(&settings)
    }
}

/// Runs one discovery round and returns the servers that answered.
///
/// Zero responses is `Ok(vec![])`.  Malformed and foreign datagrams are
/// discarded individually and never abort the round.
///
/// # Errors
///
/// Returns [`DiscoveryError::BindFailed`] if the socket cannot be bound and
/// [`DiscoveryError::SocketSetup`] if a socket option cannot be applied.
pub fn discover(settings: &DiscoverySettings) -> Result<Vec<ServerDescriptor>, DiscoveryError> {
    let deadline = Instant::now() + settings.timeout;
    let socket = open_socket(settings)?;

    let query = DiscoveryQuery::roon_core();
    debug!(
        transaction_id = query.transaction_id.as_deref().unwrap_or(""),
        "starting discovery round ({} ms)",
        settings.timeout.as_millis()
    );
    send_query(&socket, &query, settings);

    let servers = collect_responses(&socket, deadline);
    info!("discovery found {} server(s)", servers.len());
    Ok(servers)
}

/// Binds and configures the round's socket.
fn open_socket(settings: &DiscoverySettings) -> Result<UdpSocket, DiscoveryError> {
    let addr = SocketAddr::new(settings.bind_address, 0);
    let socket =
        UdpSocket::bind(addr).map_err(|source| DiscoveryError::BindFailed { addr, source })?;
    socket
        .set_broadcast(true)
        .map_err(DiscoveryError::SocketSetup)?;
    if addr.is_ipv4() {
        socket
            .set_multicast_ttl_v4(settings.multicast_ttl)
            .map_err(DiscoveryError::SocketSetup)?;
    }
    Ok(socket)
}

/// Sends the query to both targets.  A failed send only affects its own target.
fn send_query(socket: &UdpSocket, query: &DiscoveryQuery, settings: &DiscoverySettings) {
    let bytes = match encode_query(query) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("failed to encode discovery query: {e}");
            return;
        }
    };

    for target in [settings.multicast_target, settings.broadcast_target] {
        match socket.send_to(&bytes, target) {
            Ok(_) => trace!("query sent to {target}"),
            Err(e) => warn!("failed to send discovery query to {target}: {e}"),
        }
    }
}

/// Receives until `deadline`, deduplicating by `unique_id` in arrival order.
///
/// Never fails: once the socket is open, whatever arrived is the result.
fn collect_responses(socket: &UdpSocket, deadline: Instant) -> Vec<ServerDescriptor> {
    let mut buf = [0u8; RECV_BUFFER_SIZE];
    let mut seen = HashSet::new();
    let mut servers = Vec::new();

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        if let Err(e) = socket.set_read_timeout(Some(remaining.max(MIN_READ_TIMEOUT))) {
            warn!("cannot adjust discovery read timeout, ending round early: {e}");
            break;
        }

        let (len, src) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) if is_timeout_error(&e) => continue,
            Err(e) => {
                // ICMP port-unreachable from a failed send surfaces here on some
                // platforms; it says nothing about other responders.
                debug!("discovery recv error: {e}");
                continue;
            }
        };

        let Some(server) = parse_datagram(&buf[..len], src) else {
            continue;
        };
        if seen.insert(server.unique_id.clone()) {
            debug!("discovered {server}");
            servers.push(server);
        } else {
            trace!("duplicate response for {} from {src}", server.unique_id);
        }
    }

    servers
}

/// Decodes one datagram into a descriptor, or `None` if it must be discarded.
fn parse_datagram(datagram: &[u8], src: SocketAddr) -> Option<ServerDescriptor> {
    if !has_sood_magic(datagram) {
        trace!("ignoring non-SOOD datagram from {src} ({} bytes)", datagram.len());
        return None;
    }
    match decode_message(datagram) {
        Ok(SoodMessage::Response(announcement)) => Some(announcement.into_descriptor(src)),
        Ok(SoodMessage::Query(_)) => {
            trace!("ignoring query from {src}");
            None
        }
        Err(e) => {
            debug!("discarding malformed SOOD datagram from {src}: {e}");
            None
        }
    }
}

/// Returns `true` for OS timeout / would-block errors that should be retried.
fn is_timeout_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
