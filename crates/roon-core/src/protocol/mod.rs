//! SOOD protocol: message types and the binary TLV codec.

pub mod codec;
pub mod messages;

pub use codec::{
    decode_attributes, decode_message, encode_message, encode_query, encode_response,
    has_sood_magic, write_attribute, ProtocolError,
};
pub use messages::*;
