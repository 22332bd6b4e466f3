//! Minimal `StatusCode` taxonomy.
//!
//! This is not the full OPC UA status code table (that lives in the external
//! type dictionary this crate treats as opaque) — only the handful of codes
//! the client core itself inspects or produces.

/// Result/status code returned in a `ResponseHeader` or raised internally.
///
/// The top two bits of the real OPC UA 32-bit status code classify severity
/// (00 = good, 01 = uncertain, 10 = bad); we mirror that via `is_good`/
/// `is_bad`/`is_uncertain` rather than hand-rolling bit math for every value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum StatusCode {
    Good = 0x0000_0000,
    Uncertain = 0x4000_0000,
    BadUnexpectedError = 0x8000_0000,
    BadInternalError = 0x8000_1000,
    BadCommunicationError = 0x8000_4000,
    BadEncodingError = 0x8007_0000,
    BadDecodingError = 0x8008_0000,
    BadUnknownResponse = 0x8009_0000,
    BadTimeout = 0x800A_0000,
    BadRequestTimeout = 0x800D_0000,
    BadSecureChannelClosed = 0x8006_0000,
    BadSecurityChecksFailed = 0x8013_0000,
    BadConnectionClosed = 0x80AE_0000,
    BadTcpEndpointUrlInvalid = 0x8007_5000,
    BadTcpMessageTypeInvalid = 0x8007_6000,
    BadTcpMessageTooLarge = 0x8007_8000,
    BadSequenceNumberInvalid = 0x8007_9000,
    BadSessionClosed = 0x8010_3000,
    BadSessionIdInvalid = 0x8010_4000,
    BadNoSubscription = 0x8011_2000,
    BadServiceUnsupported = 0x8010_0000,
}

impl StatusCode {
    /// Top two bits `00`: the operation succeeded.
    pub fn is_good(&self) -> bool {
        (*self as u32) & 0xC000_0000 == 0x0000_0000
    }

    /// Top two bits `10`: the operation failed.
    pub fn is_bad(&self) -> bool {
        (*self as u32) & 0x8000_0000 != 0
    }

    /// Top two bits `01`: the operation partially succeeded.
    pub fn is_uncertain(&self) -> bool {
        (*self as u32) & 0xC000_0000 == 0x4000_0000
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} (0x{:08X})", self, *self as u32)
    }
}
