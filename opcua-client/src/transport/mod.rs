//! C3 Transport: owns the TCP byte stream, reads frames, writes chunk
//! streams atomically, and surfaces parsed inbound frames as events.

pub mod tcp;

use opcua_core::comms::tcp_codec::RawFrame;
use opcua_core::StatusCode;

/// One logical outbound message: the already-chunked, already-signed frames
/// that must land on the wire contiguously.
pub struct OutgoingMessage {
    pub request_id: u32,
    pub frames: Vec<Vec<u8>>,
}

/// Result of one iteration of the transport's poll loop.
pub enum TransportPollResult {
    Incoming(RawFrame),
    OutgoingSent,
    /// The connection is gone; every pending sink must be failed with this status.
    Closed(StatusCode),
}

/// Implemented by the concrete transport (currently only TCP). Polling must
/// be cancel-safe: dropping a `poll()` future before it resolves must not
/// lose bytes or desynchronize the stream.
#[async_trait::async_trait]
pub trait Transport: Send {
    async fn poll(&mut self) -> TransportPollResult;
    async fn close(&mut self);
}
