//! # roon-core
//!
//! Shared library for Roon Connect containing the SOOD discovery wire
//! protocol and the server descriptor type.
//!
//! This crate has no dependencies on sockets, files, or async runtimes; the
//! `roon-connect` crate owns all I/O.
//!
//! - **`protocol`** – How discovery datagrams look on the wire.  A query or
//!   response is the `SOOD` magic, a message-type byte, and a list of
//!   tag-length-value attributes.
//!
//! - **`domain`** – The [`ServerDescriptor`] every discovered server is
//!   normalised into, plus its validation rules.

pub mod domain;
pub mod protocol;

pub use domain::server::{DescriptorError, ServerDescriptor};
pub use protocol::codec::{decode_message, encode_message, ProtocolError};
pub use protocol::messages::{DiscoveryQuery, ServiceAnnouncement, SoodMessage};
