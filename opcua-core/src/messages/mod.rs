//! The handful of message structures this crate understands directly:
//! sequence headers and the generic request/response headers every service
//! call carries. Service-specific parameter/result bodies are opaque
//! `Vec<u8>` payloads handed to/from the external UA codec.

mod request;
mod response;
mod secure_channel_service;

pub use request::RequestHeader;
pub use response::{status_from_raw, ResponseHeader};
pub use secure_channel_service::{
    CloseSecureChannelRequest, OpenSecureChannelRequest, OpenSecureChannelResponse,
    SecurityTokenRequestType,
};

use crate::binary::{BinaryDecodable, BinaryEncodable, CodecError, Decoder, Encoder};

/// Precedes the body of every `OPN`/`MSG`/`CLO` chunk, after the security header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceHeader {
    pub sequence_number: u32,
    pub request_id: u32,
}

impl BinaryEncodable for SequenceHeader {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_u32(self.sequence_number);
        enc.write_u32(self.request_id);
    }
}

impl BinaryDecodable for SequenceHeader {
    fn decode(dec: &mut Decoder) -> Result<Self, CodecError> {
        Ok(SequenceHeader {
            sequence_number: dec.read_u32()?,
            request_id: dec.read_u32()?,
        })
    }
}
