//! [`tokio_util::codec::Decoder`] that turns a byte stream into raw frames.
//!
//! This is the transport's only view of the wire: it knows the 8-byte
//! header well enough to find frame boundaries, but does not decrypt or
//! reassemble anything — that is C2's job, driven by [`super::chunker`].

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use super::message_chunk::{decode_frame_header, ChunkFlag, MessageType, MESSAGE_CHUNK_HEADER_SIZE};

/// One still-encrypted frame as it came off the wire, with the transport
/// header already parsed off.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub message_type: MessageType,
    pub chunk_flag: ChunkFlag,
    /// Everything after the 8-byte transport header: for `HEL`/`ACK`/`ERR`
    /// this is the plain payload; for `OPN`/`MSG`/`CLO` it is the channel id
    /// followed by the (still encrypted) security region.
    pub payload: Vec<u8>,
}

#[derive(Default)]
pub struct TcpCodec {
    max_message_size: usize,
}

impl TcpCodec {
    pub fn new(max_message_size: usize) -> Self {
        TcpCodec { max_message_size }
    }
}

impl Decoder for TcpCodec {
    type Item = RawFrame;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < MESSAGE_CHUNK_HEADER_SIZE {
            return Ok(None);
        }
        let header = match decode_frame_header(&src[..MESSAGE_CHUNK_HEADER_SIZE]) {
            Ok(h) => h,
            Err(e) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("malformed frame header: {e}"),
                ))
            }
        };
        let total_len = header.message_size as usize;
        if self.max_message_size != 0 && total_len > self.max_message_size {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "frame exceeds negotiated max message size",
            ));
        }
        if src.len() < total_len {
            src.reserve(total_len - src.len());
            return Ok(None);
        }
        let mut frame = src.split_to(total_len);
        frame.advance(MESSAGE_CHUNK_HEADER_SIZE);
        Ok(Some(RawFrame {
            message_type: header.message_type,
            chunk_flag: header.chunk_flag,
            payload: frame.to_vec(),
        }))
    }
}
