//! `OpenSecureChannel`/`CloseSecureChannel` request/response bodies.
//!
//! Unlike ordinary service parameters these belong to this crate rather
//! than the external type dictionary: C5 needs concrete access to
//! `channel_id`/`token_id`/`revised_lifetime`/`server_nonce` to drive the
//! secure-channel state machine itself.

use chrono::{DateTime, Utc};

use super::RequestHeader;
use crate::binary::{BinaryDecodable, BinaryEncodable, CodecError, Decoder, Encoder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityTokenRequestType {
    Issue,
    Renew,
}

impl SecurityTokenRequestType {
    fn as_u32(self) -> u32 {
        match self {
            SecurityTokenRequestType::Issue => 0,
            SecurityTokenRequestType::Renew => 1,
        }
    }

    fn from_u32(v: u32) -> Result<Self, CodecError> {
        match v {
            0 => Ok(SecurityTokenRequestType::Issue),
            1 => Ok(SecurityTokenRequestType::Renew),
            _ => Err(CodecError::InvalidEncoding),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenSecureChannelRequest {
    pub header: RequestHeader,
    pub client_protocol_version: u32,
    pub request_type: SecurityTokenRequestType,
    pub client_nonce: Vec<u8>,
    pub requested_lifetime_ms: u32,
}

impl BinaryEncodable for OpenSecureChannelRequest {
    fn encode(&self, enc: &mut Encoder) {
        self.header.encode(enc);
        enc.write_u32(self.client_protocol_version);
        enc.write_u32(self.request_type.as_u32());
        enc.write_i32(self.client_nonce.len() as i32);
        enc.write_bytes(&self.client_nonce);
        enc.write_u32(self.requested_lifetime_ms);
    }
}

impl BinaryDecodable for OpenSecureChannelRequest {
    fn decode(dec: &mut Decoder) -> Result<Self, CodecError> {
        let header = RequestHeader::decode(dec)?;
        let client_protocol_version = dec.read_u32()?;
        let request_type = SecurityTokenRequestType::from_u32(dec.read_u32()?)?;
        let nonce_len = dec.read_i32()?;
        let client_nonce = if nonce_len < 0 {
            Vec::new()
        } else {
            dec.read_bytes(nonce_len as usize)?.to_vec()
        };
        let requested_lifetime_ms = dec.read_u32()?;
        Ok(OpenSecureChannelRequest {
            header,
            client_protocol_version,
            request_type,
            client_nonce,
            requested_lifetime_ms,
        })
    }
}

#[derive(Debug, Clone)]
pub struct OpenSecureChannelResponse {
    pub header: super::ResponseHeader,
    pub server_protocol_version: u32,
    pub channel_id: u32,
    pub token_id: u32,
    pub created_at: DateTime<Utc>,
    pub revised_lifetime_ms: u32,
    pub server_nonce: Vec<u8>,
}

impl BinaryEncodable for OpenSecureChannelResponse {
    fn encode(&self, enc: &mut Encoder) {
        self.header.encode(enc);
        enc.write_u32(self.server_protocol_version);
        enc.write_u32(self.channel_id);
        enc.write_u32(self.token_id);
        enc.write_u32(self.created_at.timestamp() as u32);
        enc.write_u32(self.revised_lifetime_ms);
        enc.write_i32(self.server_nonce.len() as i32);
        enc.write_bytes(&self.server_nonce);
    }
}

impl BinaryDecodable for OpenSecureChannelResponse {
    fn decode(dec: &mut Decoder) -> Result<Self, CodecError> {
        let header = super::ResponseHeader::decode(dec)?;
        let server_protocol_version = dec.read_u32()?;
        let channel_id = dec.read_u32()?;
        let token_id = dec.read_u32()?;
        let created_at_secs = dec.read_u32()?;
        let created_at = DateTime::from_timestamp(created_at_secs as i64, 0).unwrap_or_else(Utc::now);
        let revised_lifetime_ms = dec.read_u32()?;
        let nonce_len = dec.read_i32()?;
        let server_nonce = if nonce_len < 0 {
            Vec::new()
        } else {
            dec.read_bytes(nonce_len as usize)?.to_vec()
        };
        Ok(OpenSecureChannelResponse {
            header,
            server_protocol_version,
            channel_id,
            token_id,
            created_at,
            revised_lifetime_ms,
            server_nonce,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CloseSecureChannelRequest {
    pub header: RequestHeader,
}

impl BinaryEncodable for CloseSecureChannelRequest {
    fn encode(&self, enc: &mut Encoder) {
        self.header.encode(enc);
    }
}

impl BinaryDecodable for CloseSecureChannelRequest {
    fn decode(dec: &mut Decoder) -> Result<Self, CodecError> {
        Ok(CloseSecureChannelRequest {
            header: RequestHeader::decode(dec)?,
        })
    }
}
