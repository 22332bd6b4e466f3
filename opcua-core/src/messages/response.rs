use chrono::{DateTime, Utc};

use crate::binary::{BinaryDecodable, BinaryEncodable, CodecError, Decoder, Encoder};
use crate::status_code::StatusCode;

/// Header carried by every service response. `service_result` is the field
/// C6 inspects after `check_answer` to decide whether the call succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHeader {
    pub timestamp: DateTime<Utc>,
    pub request_handle: u32,
    pub service_result: StatusCode,
}

impl BinaryEncodable for ResponseHeader {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_u32(self.timestamp.timestamp() as u32);
        enc.write_u32(self.request_handle);
        enc.write_u32(self.service_result as u32);
    }
}

impl BinaryDecodable for ResponseHeader {
    fn decode(dec: &mut Decoder) -> Result<Self, CodecError> {
        let timestamp_secs = dec.read_u32()?;
        let timestamp = DateTime::from_timestamp(timestamp_secs as i64, 0).unwrap_or_else(Utc::now);
        let request_handle = dec.read_u32()?;
        let raw_status = dec.read_u32()?;
        let service_result = status_from_raw(raw_status);
        Ok(ResponseHeader {
            timestamp,
            request_handle,
            service_result,
        })
    }
}

/// Map a raw wire status code to our taxonomy, defaulting unknown-but-good
/// or unknown-but-bad codes to the closest umbrella variant rather than
/// failing decode outright. Exposed for response bodies elsewhere in the
/// crate graph (e.g. per-item result arrays) that carry raw status words
/// outside a `ResponseHeader`.
pub fn status_from_raw(raw: u32) -> StatusCode {
    const KNOWN: &[StatusCode] = &[
        StatusCode::Good,
        StatusCode::Uncertain,
        StatusCode::BadUnexpectedError,
        StatusCode::BadInternalError,
        StatusCode::BadCommunicationError,
        StatusCode::BadEncodingError,
        StatusCode::BadDecodingError,
        StatusCode::BadUnknownResponse,
        StatusCode::BadTimeout,
        StatusCode::BadRequestTimeout,
        StatusCode::BadSecureChannelClosed,
        StatusCode::BadSecurityChecksFailed,
        StatusCode::BadConnectionClosed,
        StatusCode::BadTcpEndpointUrlInvalid,
        StatusCode::BadTcpMessageTypeInvalid,
        StatusCode::BadTcpMessageTooLarge,
        StatusCode::BadSequenceNumberInvalid,
        StatusCode::BadSessionClosed,
        StatusCode::BadSessionIdInvalid,
        StatusCode::BadNoSubscription,
        StatusCode::BadServiceUnsupported,
    ];
    for candidate in KNOWN {
        if *candidate as u32 == raw {
            return *candidate;
        }
    }
    if raw & 0x8000_0000 != 0 {
        StatusCode::BadUnexpectedError
    } else if raw & 0x4000_0000 != 0 {
        StatusCode::Uncertain
    } else {
        StatusCode::Good
    }
}
