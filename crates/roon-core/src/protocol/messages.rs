//! SOOD protocol message types and constants.
//!
//! Every datagram starts with the 4-byte magic `SOOD` followed by a single
//! message-type byte.  The rest of the datagram is a flat list of
//! tag-length-value attributes (see [`crate::protocol::codec`]).

use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

use crate::domain::server::ServerDescriptor;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Magic prefix carried by every SOOD datagram.
pub const SOOD_MAGIC: [u8; 4] = *b"SOOD";

/// Size of the fixed datagram header: magic (4) + message type (1).
pub const HEADER_SIZE: usize = 5;

/// Well-known UDP port the SOOD responders listen on.
pub const SOOD_PORT: u16 = 9003;

/// IPv4 multicast group the SOOD responders join.
pub const SOOD_MULTICAST_ADDR: &str = "239.255.90.90";

/// Service class identifier of a Roon Core.
pub const ROON_CORE_SERVICE_ID: &str = "00720724-5143-4a9b-abac-0e50cba674bb";

/// Largest value a single TLV attribute can carry (the length field is one byte).
pub const MAX_ATTRIBUTE_LEN: usize = u8::MAX as usize;

/// Attribute tags used on the wire.
pub mod tags {
    pub const SERVICE_ID: u8 = 0x01;
    pub const UNIQUE_ID: u8 = 0x02;
    pub const DISPLAY_NAME: u8 = 0x03;
    pub const VERSION: u8 = 0x04;
    pub const HOST: u8 = 0x05;
    pub const PORT: u8 = 0x06;
    pub const TRANSACTION_ID: u8 = 0x07;
}

// ── Message type codes ────────────────────────────────────────────────────────

/// The message-type byte following the magic prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    Query = 0x01,
    Response = 0x02,
}

impl TryFrom<u8> for MessageType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(MessageType::Query),
            0x02 => Ok(MessageType::Response),
            _ => Err(()),
        }
    }
}

// ── Attribute ─────────────────────────────────────────────────────────────────

/// One decoded tag-length-value attribute, borrowing its value from the datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attribute<'a> {
    pub tag: u8,
    pub value: &'a [u8],
}

// ── Messages ──────────────────────────────────────────────────────────────────

/// Outbound probe asking every responder of `service_id` to announce itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryQuery {
    /// Service class the query targets.
    pub service_id: String,
    /// Per-round identifier; responders may echo it back.
    pub transaction_id: Option<String>,
}

impl DiscoveryQuery {
    /// A query for Roon Cores carrying a fresh random transaction id.
    pub fn roon_core() -> Self {
        Self {
            service_id: ROON_CORE_SERVICE_ID.to_string(),
            transaction_id: Some(uuid::Uuid::new_v4().to_string()),
        }
    }

    /// Always [`MessageType::Query`].
    pub fn query_type(&self) -> MessageType {
        MessageType::Query
    }
}

/// Decoded payload of a response datagram.
///
/// `host` and `port` are optional on the wire; when absent the datagram's
/// source address is used instead (see [`ServiceAnnouncement::into_descriptor`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAnnouncement {
    pub unique_id: String,
    pub display_name: String,
    pub version: String,
    pub host: Option<IpAddr>,
    pub port: Option<u16>,
    pub transaction_id: Option<String>,
}

impl ServiceAnnouncement {
    /// Normalises the announcement into a [`ServerDescriptor`], filling a
    /// missing host or port from `source`.
    pub fn into_descriptor(self, source: SocketAddr) -> ServerDescriptor {
        ServerDescriptor {
            unique_id: self.unique_id,
            display_name: self.display_name,
            host: self.host.unwrap_or_else(|| source.ip()).to_string(),
            port: self.port.unwrap_or_else(|| source.port()),
            version: self.version,
        }
    }
}

/// Any SOOD datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoodMessage {
    Query(DiscoveryQuery),
    Response(ServiceAnnouncement),
}

impl SoodMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            SoodMessage::Query(_) => MessageType::Query,
            SoodMessage::Response(_) => MessageType::Response,
        }
    }
}
