//! Binary codec for SOOD datagrams.
//!
//! Wire format:
//! ```text
//! [magic:4 = "SOOD"][msg_type:1][attr]*
//! attr = [tag:1][len:1][value:len]
//! ```
//! Attributes are not escaped or compressed.  Unknown tags are skipped on
//! decode so newer responders stay readable.

use std::net::IpAddr;

use crate::protocol::messages::{
    tags, Attribute, DiscoveryQuery, MessageType, ServiceAnnouncement, SoodMessage, HEADER_SIZE,
    MAX_ATTRIBUTE_LEN, SOOD_MAGIC,
};
use thiserror::Error;

/// Errors that can occur during datagram encoding or decoding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The datagram is shorter than the fixed header.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The first four bytes are not the SOOD magic.
    #[error("datagram does not start with the SOOD magic")]
    BadMagic,

    /// The message type byte is not a recognised value.
    #[error("unknown message type: 0x{0:02X}")]
    UnknownMessageType(u8),

    /// An attribute header or value runs past the end of the datagram.
    #[error("attribute at offset {offset} declares {declared} bytes, only {available} remain")]
    TruncatedAttribute {
        offset: usize,
        declared: usize,
        available: usize,
    },

    /// A value does not fit in the one-byte length field.
    #[error("attribute 0x{tag:02X} value is {len} bytes, maximum is 255")]
    ValueTooLong { tag: u8, len: usize },

    /// An attribute value could not be interpreted (bad UTF-8, bad port, ...).
    #[error("malformed attribute 0x{tag:02X}: {reason}")]
    MalformedAttribute { tag: u8, reason: String },

    /// A mandatory attribute is absent or empty.
    #[error("missing required attribute: {0}")]
    MissingAttribute(&'static str),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`SoodMessage`] into a datagram.
///
/// # Errors
///
/// Returns [`ProtocolError::ValueTooLong`] if any field exceeds 255 bytes.
///
/// # Examples
///
/// ```rust
/// use roon_core::protocol::{decode_message, encode_message, DiscoveryQuery, SoodMessage};
///
/// let msg = SoodMessage::Query(DiscoveryQuery::roon_core());
/// let bytes = encode_message(&msg).unwrap();
/// assert_eq!(&bytes[..4], b"SOOD");
/// assert_eq!(decode_message(&bytes).unwrap(), msg);
/// ```
pub fn encode_message(msg: &SoodMessage) -> Result<Vec<u8>, ProtocolError> {
    match msg {
        SoodMessage::Query(q) => encode_query(q),
        SoodMessage::Response(r) => encode_response(r),
    }
}

/// Encodes a query datagram: header plus service id and optional transaction id.
///
/// # Errors
///
/// Returns [`ProtocolError::ValueTooLong`] for oversized fields.
pub fn encode_query(query: &DiscoveryQuery) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = header(MessageType::Query);
    write_attribute(&mut buf, tags::SERVICE_ID, query.service_id.as_bytes())?;
    if let Some(tid) = &query.transaction_id {
        write_attribute(&mut buf, tags::TRANSACTION_ID, tid.as_bytes())?;
    }
    Ok(buf)
}

/// Encodes a response datagram.  `host` and `port` are written only when set.
///
/// # Errors
///
/// Returns [`ProtocolError::ValueTooLong`] for oversized fields.
pub fn encode_response(resp: &ServiceAnnouncement) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = header(MessageType::Response);
    write_attribute(&mut buf, tags::UNIQUE_ID, resp.unique_id.as_bytes())?;
    write_attribute(&mut buf, tags::DISPLAY_NAME, resp.display_name.as_bytes())?;
    write_attribute(&mut buf, tags::VERSION, resp.version.as_bytes())?;
    if let Some(host) = resp.host {
        write_attribute(&mut buf, tags::HOST, host.to_string().as_bytes())?;
    }
    if let Some(port) = resp.port {
        write_attribute(&mut buf, tags::PORT, &port.to_be_bytes())?;
    }
    if let Some(tid) = &resp.transaction_id {
        write_attribute(&mut buf, tags::TRANSACTION_ID, tid.as_bytes())?;
    }
    Ok(buf)
}

/// Returns `true` if `bytes` starts with the SOOD magic.
///
/// Cheap pre-filter for foreign traffic arriving on the discovery socket.
pub fn has_sood_magic(bytes: &[u8]) -> bool {
    bytes.len() >= SOOD_MAGIC.len() && bytes[..SOOD_MAGIC.len()] == SOOD_MAGIC
}

/// Decodes one complete datagram.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the header, any attribute, or a required
/// field is invalid.  One bad attribute rejects the whole datagram.
pub fn decode_message(bytes: &[u8]) -> Result<SoodMessage, ProtocolError> {
    if !has_sood_magic(bytes) {
        return Err(if bytes.len() < SOOD_MAGIC.len() {
            ProtocolError::InsufficientData {
                needed: HEADER_SIZE,
                available: bytes.len(),
            }
        } else {
            ProtocolError::BadMagic
        });
    }
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let type_byte = bytes[4];
    let msg_type =
        MessageType::try_from(type_byte).map_err(|_| ProtocolError::UnknownMessageType(type_byte))?;
    let attrs = decode_attributes(&bytes[HEADER_SIZE..])?;

    match msg_type {
        MessageType::Query => decode_query(&attrs).map(SoodMessage::Query),
        MessageType::Response => decode_response(&attrs).map(SoodMessage::Response),
    }
}

/// Splits an attribute section into its TLV entries, in wire order.
///
/// # Errors
///
/// Returns [`ProtocolError::TruncatedAttribute`] if an attribute header or
/// value extends past the end of `bytes`.
pub fn decode_attributes(bytes: &[u8]) -> Result<Vec<Attribute<'_>>, ProtocolError> {
    let mut attrs = Vec::new();
    let mut offset = 0;

    while offset < bytes.len() {
        if bytes.len() - offset < 2 {
            return Err(ProtocolError::TruncatedAttribute {
                offset,
                declared: 2,
                available: bytes.len() - offset,
            });
        }
        let tag = bytes[offset];
        let len = bytes[offset + 1] as usize;
        let start = offset + 2;
        if bytes.len() - start < len {
            return Err(ProtocolError::TruncatedAttribute {
                offset,
                declared: len,
                available: bytes.len() - start,
            });
        }
        attrs.push(Attribute {
            tag,
            value: &bytes[start..start + len],
        });
        offset = start + len;
    }

    Ok(attrs)
}

/// Appends one `[tag][len][value]` attribute to `buf`.
///
/// # Errors
///
/// Returns [`ProtocolError::ValueTooLong`] if `value` exceeds 255 bytes.
pub fn write_attribute(buf: &mut Vec<u8>, tag: u8, value: &[u8]) -> Result<(), ProtocolError> {
    if value.len() > MAX_ATTRIBUTE_LEN {
        return Err(ProtocolError::ValueTooLong {
            tag,
            len: value.len(),
        });
    }
    buf.push(tag);
    buf.push(value.len() as u8);
    buf.extend_from_slice(value);
    Ok(())
}

// ── Message decoding ──────────────────────────────────────────────────────────

fn decode_query(attrs: &[Attribute<'_>]) -> Result<DiscoveryQuery, ProtocolError> {
    let mut service_id = None;
    let mut transaction_id = None;

    for attr in attrs {
        match attr.tag {
            tags::SERVICE_ID => set_once(&mut service_id, read_string(attr)?),
            tags::TRANSACTION_ID => set_once(&mut transaction_id, read_string(attr)?),
            _ => {}
        }
    }

    Ok(DiscoveryQuery {
        service_id: non_empty(service_id, "service_id")?,
        transaction_id,
    })
}

fn decode_response(attrs: &[Attribute<'_>]) -> Result<ServiceAnnouncement, ProtocolError> {
    let mut unique_id = None;
    let mut display_name = None;
    let mut version = None;
    let mut host = None;
    let mut port = None;
    let mut transaction_id = None;

    for attr in attrs {
        match attr.tag {
            tags::UNIQUE_ID => set_once(&mut unique_id, read_string(attr)?),
            tags::DISPLAY_NAME => set_once(&mut display_name, read_string(attr)?),
            tags::VERSION => set_once(&mut version, read_string(attr)?),
            tags::HOST => set_once(&mut host, read_host(attr)?),
            tags::PORT => set_once(&mut port, read_port(attr)?),
            tags::TRANSACTION_ID => set_once(&mut transaction_id, read_string(attr)?),
            _ => {}
        }
    }

    Ok(ServiceAnnouncement {
        unique_id: non_empty(unique_id, "unique_id")?,
        display_name: display_name.unwrap_or_default(),
        version: version.unwrap_or_default(),
        host,
        port,
        transaction_id,
    })
}

// ── Low-level helpers ─────────────────────────────────────────────────────────

fn header(msg_type: MessageType) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64);
    buf.extend_from_slice(&SOOD_MAGIC);
    buf.push(msg_type as u8);
    buf
}

/// First occurrence of a repeated tag wins.
fn set_once<T>(slot: &mut Option<T>, value: T) {
    if slot.is_none() {
        *slot = Some(value);
    }
}

fn non_empty(value: Option<String>, name: &'static str) -> Result<String, ProtocolError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ProtocolError::MissingAttribute(name)),
    }
}

fn read_string(attr: &Attribute<'_>) -> Result<String, ProtocolError> {
    std::str::from_utf8(attr.value)
        .map(str::to_string)
        .map_err(|e| ProtocolError::MalformedAttribute {
            tag: attr.tag,
            reason: format!("invalid UTF-8: {e}"),
        })
}

fn read_host(attr: &Attribute<'_>) -> Result<IpAddr, ProtocolError> {
    let text = read_string(attr)?;
    text.parse().map_err(|_| ProtocolError::MalformedAttribute {
        tag: attr.tag,
        reason: format!("not an IP literal: {text:?}"),
    })
}

fn read_port(attr: &Attribute<'_>) -> Result<u16, ProtocolError> {
    let bytes: [u8; 2] = attr
        .value
        .try_into()
        .map_err(|_| ProtocolError::MalformedAttribute {
            tag: attr.tag,
            reason: format!("port must be 2 bytes, got {}", attr.value.len()),
        })?;
    match u16::from_be_bytes(bytes) {
        0 => Err(ProtocolError::MalformedAttribute {
            tag: attr.tag,
            reason: "port 0".to_string(),
        }),
        port => Ok(port),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::ROON_CORE_SERVICE_ID;

    fn announcement() -> ServiceAnnouncement {
        ServiceAnnouncement {
            unique_id: "c0ffee00-1111-2222-3333-444455556666".to_string(),
            display_name: "Living Room Core".to_string(),
            version: "2.0 (build 1470)".to_string(),
            host: Some("10.0.0.5".parse().unwrap()),
            port: Some(9100),
            transaction_id: None,
        }
    }

    fn response_with(attrs: &[(u8, &[u8])]) -> Vec<u8> {
        let mut buf = header(MessageType::Response);
        for (tag, value) in attrs {
            write_attribute(&mut buf, *tag, value).unwrap();
        }
        buf
    }

    // ── Query ────────────────────────────────────────────────────────────────

    #[test]
    fn test_query_layout_is_magic_type_then_service_id() {
        // Arrange
        let query = DiscoveryQuery {
            service_id: ROON_CORE_SERVICE_ID.to_string(),
            transaction_id: None,
        };

        // Act
        let bytes = encode_query(&query).unwrap();

        // Assert
        assert_eq!(&bytes[..4], b"SOOD");
        assert_eq!(bytes[4], 0x01);
        assert_eq!(bytes[5], tags::SERVICE_ID);
        assert_eq!(bytes[6] as usize, ROON_CORE_SERVICE_ID.len());
        assert_eq!(&bytes[7..], ROON_CORE_SERVICE_ID.as_bytes());
    }

    #[test]
    fn test_query_round_trip_with_transaction_id() {
        let query = DiscoveryQuery::roon_core();
        let bytes = encode_query(&query).unwrap();
        assert_eq!(decode_message(&bytes), Ok(SoodMessage::Query(query)));
    }

    #[test]
    fn test_query_without_service_id_is_rejected() {
        let bytes = header(MessageType::Query);
        assert_eq!(
            decode_message(&bytes),
            Err(ProtocolError::MissingAttribute("service_id"))
        );
    }

    // ── Response ─────────────────────────────────────────────────────────────

    #[test]
    fn test_response_round_trip() {
        let resp = announcement();
        let bytes = encode_response(&resp).unwrap();
        assert_eq!(decode_message(&bytes), Ok(SoodMessage::Response(resp)));
    }

    #[test]
    fn test_response_ipv6_host_round_trip() {
        let mut resp = announcement();
        resp.host = Some("fe80::1c2b:3aff:fe4d:5e6f".parse().unwrap());
        let bytes = encode_response(&resp).unwrap();
        assert_eq!(decode_message(&bytes), Ok(SoodMessage::Response(resp)));
    }

    #[test]
    fn test_response_without_endpoint_omits_host_and_port_tags() {
        // Arrange
        let mut resp = announcement();
        resp.host = None;
        resp.port = None;

        // Act
        let bytes = encode_response(&resp).unwrap();
        let attrs = decode_attributes(&bytes[HEADER_SIZE..]).unwrap();

        // Assert
        assert!(attrs.iter().all(|a| a.tag != tags::HOST && a.tag != tags::PORT));
        assert_eq!(decode_message(&bytes), Ok(SoodMessage::Response(resp)));
    }

    #[test]
    fn test_response_missing_name_and_version_decode_as_empty() {
        let bytes = response_with(&[(tags::UNIQUE_ID, b"abc")]);

        let Ok(SoodMessage::Response(resp)) = decode_message(&bytes) else {
            panic!("expected a response");
        };

        assert_eq!(resp.unique_id, "abc");
        assert!(resp.display_name.is_empty());
        assert!(resp.version.is_empty());
    }

    #[test]
    fn test_response_unknown_tags_are_skipped() {
        let bytes = response_with(&[(0x7F, b"future"), (tags::UNIQUE_ID, b"abc"), (0x80, b"")]);
        assert!(matches!(
            decode_message(&bytes),
            Ok(SoodMessage::Response(ServiceAnnouncement { ref unique_id, .. })) if unique_id == "abc"
        ));
    }

    #[test]
    fn test_response_repeated_tag_keeps_first_value() {
        let bytes = response_with(&[(tags::UNIQUE_ID, b"first"), (tags::UNIQUE_ID, b"second")]);
        let Ok(SoodMessage::Response(resp)) = decode_message(&bytes) else {
            panic!("expected a response");
        };
        assert_eq!(resp.unique_id, "first");
    }

    #[test]
    fn test_response_without_unique_id_is_rejected() {
        let bytes = response_with(&[(tags::DISPLAY_NAME, b"nameless")]);
        assert_eq!(
            decode_message(&bytes),
            Err(ProtocolError::MissingAttribute("unique_id"))
        );
    }

    #[test]
    fn test_response_with_empty_unique_id_is_rejected() {
        let bytes = response_with(&[(tags::UNIQUE_ID, b"")]);
        assert_eq!(
            decode_message(&bytes),
            Err(ProtocolError::MissingAttribute("unique_id"))
        );
    }

    #[test]
    fn test_response_with_one_byte_port_is_malformed() {
        let bytes = response_with(&[(tags::UNIQUE_ID, b"abc"), (tags::PORT, &[0x23])]);
        assert!(matches!(
            decode_message(&bytes),
            Err(ProtocolError::MalformedAttribute { tag: tags::PORT, .. })
        ));
    }

    #[test]
    fn test_response_with_port_zero_is_malformed() {
        let bytes = response_with(&[(tags::UNIQUE_ID, b"abc"), (tags::PORT, &[0, 0])]);
        assert!(matches!(
            decode_message(&bytes),
            Err(ProtocolError::MalformedAttribute { tag: tags::PORT, .. })
        ));
    }

    #[test]
    fn test_response_with_hostname_instead_of_ip_is_malformed() {
        let bytes = response_with(&[(tags::UNIQUE_ID, b"abc"), (tags::HOST, b"core.local")]);
        assert!(matches!(
            decode_message(&bytes),
            Err(ProtocolError::MalformedAttribute { tag: tags::HOST, .. })
        ));
    }

    #[test]
    fn test_response_with_invalid_utf8_is_malformed() {
        let bytes = response_with(&[(tags::UNIQUE_ID, &[0xFF, 0xFE])]);
        assert!(matches!(
            decode_message(&bytes),
            Err(ProtocolError::MalformedAttribute { tag: tags::UNIQUE_ID, .. })
        ));
    }

    // ── Header errors ────────────────────────────────────────────────────────

    #[test]
    fn test_decode_empty_bytes_returns_insufficient_data() {
        assert!(matches!(
            decode_message(&[]),
            Err(ProtocolError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_decode_magic_without_type_returns_insufficient_data() {
        assert!(matches!(
            decode_message(b"SOOD"),
            Err(ProtocolError::InsufficientData { needed: 5, available: 4 })
        ));
    }

    #[test]
    fn test_decode_foreign_magic_returns_bad_magic() {
        assert_eq!(
            decode_message(b"M-SEARCH * HTTP/1.1\r\n"),
            Err(ProtocolError::BadMagic)
        );
    }

    #[test]
    fn test_decode_unknown_message_type_returns_error() {
        let bytes = [b'S', b'O', b'O', b'D', 0x52];
        assert_eq!(
            decode_message(&bytes),
            Err(ProtocolError::UnknownMessageType(0x52))
        );
    }

    #[test]
    fn test_has_sood_magic() {
        assert!(has_sood_magic(b"SOOD\x02"));
        assert!(!has_sood_magic(b"SOO"));
        assert!(!has_sood_magic(b"NOTIFY * HTTP/1.1"));
    }

    // ── TLV framing ──────────────────────────────────────────────────────────

    #[test]
    fn test_decode_attributes_empty_section_is_ok() {
        assert_eq!(decode_attributes(&[]), Ok(vec![]));
    }

    #[test]
    fn test_decode_attributes_length_past_end_is_truncated() {
        // tag 0x02, declares 10 bytes, provides 3
        let bytes = [0x02, 10, b'a', b'b', b'c'];
        assert_eq!(
            decode_attributes(&bytes),
            Err(ProtocolError::TruncatedAttribute {
                offset: 0,
                declared: 10,
                available: 3
            })
        );
    }

    #[test]
    fn test_decode_attributes_dangling_tag_byte_is_truncated() {
        let bytes = [0x02, 1, b'a', 0x03];
        assert!(matches!(
            decode_attributes(&bytes),
            Err(ProtocolError::TruncatedAttribute { offset: 3, .. })
        ));
    }

    #[test]
    fn test_decode_attributes_zero_length_value() {
        let bytes = [0x04, 0];
        let attrs = decode_attributes(&bytes).unwrap();
        assert_eq!(attrs, vec![Attribute { tag: 0x04, value: &[] }]);
    }

    #[test]
    fn test_write_attribute_accepts_255_bytes() {
        let mut buf = Vec::new();
        write_attribute(&mut buf, tags::DISPLAY_NAME, &[b'x'; 255]).unwrap();
        assert_eq!(buf.len(), 257);
        assert_eq!(buf[1], 255);
    }

    #[test]
    fn test_write_attribute_rejects_256_bytes() {
        let mut buf = Vec::new();
        let result = write_attribute(&mut buf, tags::DISPLAY_NAME, &[b'x'; 256]);
        assert_eq!(
            result,
            Err(ProtocolError::ValueTooLong {
                tag: tags::DISPLAY_NAME,
                len: 256
            })
        );
        assert!(buf.is_empty(), "nothing may be written on error");
    }

    #[test]
    fn test_encode_response_with_oversized_name_fails() {
        let mut resp = announcement();
        resp.display_name = "n".repeat(300);
        assert!(matches!(
            encode_response(&resp),
            Err(ProtocolError::ValueTooLong { tag: tags::DISPLAY_NAME, .. })
        ));
    }
}
