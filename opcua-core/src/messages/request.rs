use chrono::{DateTime, Utc};

use crate::binary::{BinaryDecodable, BinaryEncodable, CodecError, Decoder, Encoder};

/// Header carried by every outbound service request.
///
/// `request_handle` is a client-chosen, monotonic, server-echoed value
/// distinct from the transport-level `request_id` that indexes the pending
/// map — see the crate's design notes on keeping the two counters
/// independent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHeader {
    pub authentication_token: Vec<u8>,
    pub timestamp: DateTime<Utc>,
    pub request_handle: u32,
    pub return_diagnostics: u32,
    pub audit_entry_id: String,
    pub timeout_hint_ms: u32,
}

impl RequestHeader {
    pub fn new(request_handle: u32, timeout_hint_ms: u32) -> Self {
        RequestHeader {
            authentication_token: Vec::new(),
            timestamp: Utc::now(),
            request_handle,
            return_diagnostics: 0,
            audit_entry_id: String::new(),
            timeout_hint_ms,
        }
    }
}

impl BinaryEncodable for RequestHeader {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_i32(self.authentication_token.len() as i32);
        enc.write_bytes(&self.authentication_token);
        enc.write_u32(self.timestamp.timestamp() as u32);
        enc.write_u32(self.request_handle);
        enc.write_u32(self.return_diagnostics);
        enc.write_string(&self.audit_entry_id);
        enc.write_u32(self.timeout_hint_ms);
    }
}

impl BinaryDecodable for RequestHeader {
    fn decode(dec: &mut Decoder) -> Result<Self, CodecError> {
        let token_len = dec.read_i32()?;
        let authentication_token = if token_len < 0 {
            Vec::new()
        } else {
            dec.read_bytes(token_len as usize)?.to_vec()
        };
        let timestamp_secs = dec.read_u32()?;
        let timestamp = DateTime::from_timestamp(timestamp_secs as i64, 0).unwrap_or_else(Utc::now);
        Ok(RequestHeader {
            authentication_token,
            timestamp,
            request_handle: dec.read_u32()?,
            return_diagnostics: dec.read_u32()?,
            audit_entry_id: dec.read_string()?,
            timeout_hint_ms: dec.read_u32()?,
        })
    }
}
