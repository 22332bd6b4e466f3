//! C2 outbound chunk splitting and inbound chunk reassembly.

use std::collections::HashMap;

use crate::comms::message_chunk::{
    ChunkFlag, FrameHeader, MessageType, MESSAGE_CHUNK_HEADER_SIZE,
};
use crate::comms::secure_channel::SecureChannel;
use crate::errors::Error;
use crate::messages::SequenceHeader;
use crate::binary::BinaryEncodable;

/// Outcome of feeding one inbound chunk to the reassembler.
pub enum ReassembledMessage {
    /// The chunk completed a logical message; here is its body.
    Complete { request_id: u32, body: Vec<u8> },
    /// An intermediate (`C`) chunk was absorbed; nothing to deliver yet.
    Pending,
    /// An `A` (abort) chunk discarded an in-progress reassembly.
    Aborted { request_id: u32 },
}

/// Splits logical messages into chunks on the way out, and reassembles
/// chunks back into logical messages on the way in. Holds no socket state
/// of its own — it is driven by [`super::secure_channel::SecureChannel`] for
/// sequencing/security and by the transport for I/O.
#[derive(Default)]
pub struct Chunker {
    /// Keyed by `request_id` so that, in principle, chunk streams for
    /// distinct in-flight messages never collide even though the transport
    /// only ever interleaves one message's chunks at a time in practice.
    reassembly: HashMap<u32, Vec<u8>>,
}

impl Chunker {
    pub fn new() -> Self {
        Chunker::default()
    }

    /// Split `body` into one or more wire-ready chunk frames for
    /// `message_type`/`request_id`, signing/encrypting each per the
    /// channel's security policy. `max_chunk_size` is the negotiated
    /// send buffer size; the max plaintext-per-chunk is derived from it
    /// after subtracting header, security and sequence-header overhead.
    pub fn encode(
        secure_channel: &mut SecureChannel,
        message_type: MessageType,
        request_id: u32,
        body: &[u8],
        max_chunk_size: usize,
    ) -> Result<Vec<Vec<u8>>, Error> {
        let security_overhead = if message_type == MessageType::OpenSecureChannel {
            secure_channel.security_policy().asymmetric_overhead()
        } else {
            secure_channel.security_policy().symmetric_overhead()
        };
        // transport header + channel id + token id + sequence header + security overhead
        let fixed_overhead = MESSAGE_CHUNK_HEADER_SIZE + 4 + 4 + 8 + security_overhead;
        if max_chunk_size <= fixed_overhead {
            return Err(Error::Protocol("send buffer too small to frame a chunk".into()));
        }
        let max_body_per_chunk = max_chunk_size - fixed_overhead;

        let chunks: Vec<&[u8]> = if body.is_empty() {
            vec![&body[..]]
        } else {
            body.chunks(max_body_per_chunk).collect()
        };

        let mut out = Vec::with_capacity(chunks.len());
        let channel_id = secure_channel.channel_id();
        let token_id = secure_channel.token_id();
        for (i, chunk_body) in chunks.iter().enumerate() {
            let is_last = i == chunks.len() - 1;
            let seq = SequenceHeader {
                sequence_number: secure_channel.next_local_sequence_number(),
                request_id,
            };

            let mut plaintext = Vec::with_capacity(seq_header_size() + chunk_body.len());
            plaintext.extend_from_slice(&seq.encode_to_vec());
            plaintext.extend_from_slice(chunk_body);
            let plain_len = plaintext.len();

            secure_channel
                .security_policy()
                .sign_and_encrypt(&mut plaintext, plain_len)?;

            let total_len = MESSAGE_CHUNK_HEADER_SIZE + 4 + 4 + plaintext.len();
            let header = FrameHeader {
                message_type,
                chunk_flag: if is_last {
                    ChunkFlag::Final
                } else {
                    ChunkFlag::Intermediate
                },
                message_size: total_len as u32,
            };
            let mut frame = Vec::with_capacity(total_len);
            frame.extend_from_slice(&header.encode());
            frame.extend_from_slice(&channel_id.to_le_bytes());
            frame.extend_from_slice(&token_id.to_le_bytes());
            frame.extend_from_slice(&plaintext);
            out.push(frame);
        }
        Ok(out)
    }

    /// Feed one inbound chunk (the bytes following the 8-byte transport
    /// header, i.e. starting at the channel id) to the reassembler. Rejects
    /// a token id the channel doesn't recognize — neither the current token
    /// nor, during a renewal's grace window, the previous one — as a fatal
    /// security error.
    pub fn decode(
        &mut self,
        secure_channel: &mut SecureChannel,
        chunk_flag: ChunkFlag,
        mut payload: Vec<u8>,
    ) -> Result<ReassembledMessage, Error> {
        if payload.len() < 8 {
            return Err(Error::Protocol(
                "chunk shorter than channel id + token id fields".into(),
            ));
        }
        let incoming_channel_id = u32::from_le_bytes(payload[0..4].try_into().unwrap());
        if secure_channel.channel_id() != 0 && incoming_channel_id != secure_channel.channel_id() {
            return Err(Error::Protocol(format!(
                "channel id mismatch: expected {}, got {}",
                secure_channel.channel_id(),
                incoming_channel_id
            )));
        }
        let incoming_token_id = u32::from_le_bytes(payload[4..8].try_into().unwrap());
        if !secure_channel.is_valid_token(incoming_token_id) {
            return Err(Error::Security(format!(
                "unknown security token id {incoming_token_id}"
            )));
        }
        let mut security_region = payload.split_off(8);

        let plain_len = secure_channel
            .security_policy()
            .verify_and_decrypt(&mut security_region)?;
        security_region.truncate(plain_len);

        if security_region.len() < 8 {
            return Err(Error::Protocol("chunk shorter than sequence header".into()));
        }
        let sequence_number = u32::from_le_bytes(security_region[0..4].try_into().unwrap());
        let request_id = u32::from_le_bytes(security_region[4..8].try_into().unwrap());
        let body = &security_region[8..];

        if chunk_flag == ChunkFlag::Abort {
            self.reassembly.remove(&request_id);
            return Ok(ReassembledMessage::Aborted { request_id });
        }

        secure_channel.validate_remote_sequence_number(sequence_number)?;

        let buffer = self.reassembly.entry(request_id).or_default();
        buffer.extend_from_slice(body);

        match chunk_flag {
            ChunkFlag::Final => {
                let body = self.reassembly.remove(&request_id).unwrap_or_default();
                Ok(ReassembledMessage::Complete { request_id, body })
            }
            ChunkFlag::Intermediate => Ok(ReassembledMessage::Pending),
            ChunkFlag::Abort => unreachable!("handled above"),
        }
    }
}

fn seq_header_size() -> usize {
    8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comms::message_chunk::decode_frame_header;
    use crate::security_policy::NoOpSecurityPolicy;
    use std::sync::Arc;

    fn channel() -> SecureChannel {
        let mut c = SecureChannel::new(Arc::new(NoOpSecurityPolicy));
        c.set_channel_params(7, 1, 3600_000, vec![]);
        c
    }

    #[test]
    fn round_trips_a_single_chunk_message() {
        let mut sc = channel();
        let body = b"hello opc ua".to_vec();
        let frames = Chunker::encode(&mut sc, MessageType::Message, 7, &body, 4096).unwrap();
        assert_eq!(frames.len(), 1);

        let mut decode_sc = channel();
        let mut chunker = Chunker::new();
        let header = decode_frame_header(&frames[0]).unwrap();
        let payload = frames[0][MESSAGE_CHUNK_HEADER_SIZE..].to_vec();
        match chunker
            .decode(&mut decode_sc, header.chunk_flag, payload)
            .unwrap()
        {
            ReassembledMessage::Complete { request_id, body: got } => {
                assert_eq!(request_id, 7);
                assert_eq!(got, body);
            }
            _ => panic!("expected a complete message"),
        }
    }

    #[test]
    fn splits_large_bodies_into_contiguous_chunks() {
        let mut sc = channel();
        let body = vec![0xABu8; 5000];
        let frames = Chunker::encode(&mut sc, MessageType::Message, 7, &body, 1024).unwrap();
        assert!(frames.len() > 1);
        for (i, frame) in frames.iter().enumerate() {
            let header = decode_frame_header(frame).unwrap();
            let expect_final = i == frames.len() - 1;
            assert_eq!(header.chunk_flag == ChunkFlag::Final, expect_final);
        }
    }

    #[test]
    fn reassembles_three_chunk_scenario() {
        // Mirrors the spec's literal scenario: C,C,F chunks, seq 42,43,44, request_id=7.
        let mut sc = channel();
        sc.validate_remote_sequence_number(41).unwrap();
        let mut chunker = Chunker::new();

        let make_chunk = |seq: u32, request_id: u32, body: &[u8]| -> Vec<u8> {
            let header = SequenceHeader {
                sequence_number: seq,
                request_id,
            };
            let mut payload = 7u32.to_le_bytes().to_vec();
            payload.extend_from_slice(&1u32.to_le_bytes());
            payload.extend_from_slice(&header.encode_to_vec());
            payload.extend_from_slice(body);
            payload
        };

        assert!(matches!(
            chunker
                .decode(&mut sc, ChunkFlag::Intermediate, make_chunk(42, 7, b"aaa"))
                .unwrap(),
            ReassembledMessage::Pending
        ));
        assert!(matches!(
            chunker
                .decode(&mut sc, ChunkFlag::Intermediate, make_chunk(43, 7, b"bbb"))
                .unwrap(),
            ReassembledMessage::Pending
        ));
        match chunker
            .decode(&mut sc, ChunkFlag::Final, make_chunk(44, 7, b"ccc"))
            .unwrap()
        {
            ReassembledMessage::Complete { request_id, body } => {
                assert_eq!(request_id, 7);
                assert_eq!(body, b"aaabbbccc");
            }
            _ => panic!("expected a complete message"),
        }
    }

    #[test]
    fn abort_chunk_discards_in_progress_reassembly() {
        let mut sc = channel();
        let mut chunker = Chunker::new();
        let mut payload = 7u32.to_le_bytes().to_vec();
        payload.extend_from_slice(&1u32.to_le_bytes());
        payload.extend_from_slice(
            &SequenceHeader {
                sequence_number: 1,
                request_id: 9,
            }
            .encode_to_vec(),
        );
        chunker
            .decode(&mut sc, ChunkFlag::Intermediate, payload)
            .unwrap();

        let mut abort_payload = 7u32.to_le_bytes().to_vec();
        abort_payload.extend_from_slice(&1u32.to_le_bytes());
        abort_payload.extend_from_slice(
            &SequenceHeader {
                sequence_number: 2,
                request_id: 9,
            }
            .encode_to_vec(),
        );
        match chunker
            .decode(&mut sc, ChunkFlag::Abort, abort_payload)
            .unwrap()
        {
            ReassembledMessage::Aborted { request_id } => assert_eq!(request_id, 9),
            _ => panic!("expected abort"),
        }
        assert!(chunker.reassembly.get(&9).is_none());
    }

    #[test]
    fn sequence_regression_is_fatal() {
        let mut sc = channel();
        let mut chunker = Chunker::new();
        let mut payload = 7u32.to_le_bytes().to_vec();
        payload.extend_from_slice(&1u32.to_le_bytes());
        payload.extend_from_slice(
            &SequenceHeader {
                sequence_number: 5,
                request_id: 1,
            }
            .encode_to_vec(),
        );
        chunker
            .decode(&mut sc, ChunkFlag::Final, payload.clone())
            .unwrap();

        let mut regressed = 7u32.to_le_bytes().to_vec();
        regressed.extend_from_slice(&1u32.to_le_bytes());
        regressed.extend_from_slice(
            &SequenceHeader {
                sequence_number: 4,
                request_id: 1,
            }
            .encode_to_vec(),
        );
        assert!(chunker.decode(&mut sc, ChunkFlag::Final, regressed).is_err());
    }

    #[test]
    fn unknown_token_id_is_rejected() {
        let mut sc = channel();
        let mut chunker = Chunker::new();
        let mut payload = 7u32.to_le_bytes().to_vec();
        payload.extend_from_slice(&999u32.to_le_bytes());
        payload.extend_from_slice(
            &SequenceHeader {
                sequence_number: 1,
                request_id: 1,
            }
            .encode_to_vec(),
        );
        let err = chunker
            .decode(&mut sc, ChunkFlag::Final, payload)
            .unwrap_err();
        assert!(matches!(err, Error::Security(_)));
    }

    #[test]
    fn previous_token_remains_valid_through_chunker_during_renewal() {
        let mut sc = channel();
        let mut chunker = Chunker::new();
        // Renew: channel keeps accepting the old token (1) alongside the new one (2).
        sc.set_channel_params(7, 2, 3600_000, vec![]);

        let mut old_token_payload = 7u32.to_le_bytes().to_vec();
        old_token_payload.extend_from_slice(&1u32.to_le_bytes());
        old_token_payload.extend_from_slice(
            &SequenceHeader {
                sequence_number: 1,
                request_id: 5,
            }
            .encode_to_vec(),
        );
        assert!(matches!(
            chunker
                .decode(&mut sc, ChunkFlag::Final, old_token_payload)
                .unwrap(),
            ReassembledMessage::Complete { .. }
        ));

        sc.expire_previous_token();
        let mut stale_payload = 7u32.to_le_bytes().to_vec();
        stale_payload.extend_from_slice(&1u32.to_le_bytes());
        stale_payload.extend_from_slice(
            &SequenceHeader {
                sequence_number: 2,
                request_id: 6,
            }
            .encode_to_vec(),
        );
        assert!(matches!(
            chunker.decode(&mut sc, ChunkFlag::Final, stale_payload),
            Err(Error::Security(_))
        ));
    }
}
