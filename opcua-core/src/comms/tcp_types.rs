//! `Hello`/`Acknowledge`/`Error` payload structures (OPC UA TCP, part 6 §7.1).

use crate::binary::{BinaryDecodable, BinaryEncodable, CodecError, Decoder, Encoder};

pub const PROTOCOL_VERSION: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloMessage {
    pub protocol_version: u32,
    pub receive_buffer_size: u32,
    pub send_buffer_size: u32,
    pub max_message_size: u32,
    pub max_chunk_count: u32,
    pub endpoint_url: String,
}

impl HelloMessage {
    pub fn new(
        endpoint_url: &str,
        send_buffer_size: u32,
        receive_buffer_size: u32,
        max_message_size: u32,
        max_chunk_count: u32,
    ) -> Self {
        HelloMessage {
            protocol_version: PROTOCOL_VERSION,
            receive_buffer_size,
            send_buffer_size,
            max_message_size,
            max_chunk_count,
            endpoint_url: endpoint_url.to_string(),
        }
    }
}

impl BinaryEncodable for HelloMessage {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_u32(self.protocol_version);
        enc.write_u32(self.receive_buffer_size);
        enc.write_u32(self.send_buffer_size);
        enc.write_u32(self.max_message_size);
        enc.write_u32(self.max_chunk_count);
        enc.write_string(&self.endpoint_url);
    }
}

impl BinaryDecodable for HelloMessage {
    fn decode(dec: &mut Decoder) -> Result<Self, CodecError> {
        Ok(HelloMessage {
            protocol_version: dec.read_u32()?,
            receive_buffer_size: dec.read_u32()?,
            send_buffer_size: dec.read_u32()?,
            max_message_size: dec.read_u32()?,
            max_chunk_count: dec.read_u32()?,
            endpoint_url: dec.read_string()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcknowledgeMessage {
    pub protocol_version: u32,
    pub receive_buffer_size: u32,
    pub send_buffer_size: u32,
    pub max_message_size: u32,
    pub max_chunk_count: u32,
}

impl BinaryEncodable for AcknowledgeMessage {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_u32(self.protocol_version);
        enc.write_u32(self.receive_buffer_size);
        enc.write_u32(self.send_buffer_size);
        enc.write_u32(self.max_message_size);
        enc.write_u32(self.max_chunk_count);
    }
}

impl BinaryDecodable for AcknowledgeMessage {
    fn decode(dec: &mut Decoder) -> Result<Self, CodecError> {
        Ok(AcknowledgeMessage {
            protocol_version: dec.read_u32()?,
            receive_buffer_size: dec.read_u32()?,
            send_buffer_size: dec.read_u32()?,
            max_message_size: dec.read_u32()?,
            max_chunk_count: dec.read_u32()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMessage {
    pub error: u32,
    pub reason: String,
}

impl BinaryEncodable for ErrorMessage {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_u32(self.error);
        enc.write_string(&self.reason);
    }
}

impl BinaryDecodable for ErrorMessage {
    fn decode(dec: &mut Decoder) -> Result<Self, CodecError> {
        Ok(ErrorMessage {
            error: dec.read_u32()?,
            reason: dec.read_string()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_round_trips() {
        let hello = HelloMessage::new("opc.tcp://h:4840", 65536, 65536, 0, 0);
        let bytes = hello.encode_to_vec();
        let mut dec = Decoder::new(&bytes);
        let back = HelloMessage::decode(&mut dec).unwrap();
        assert_eq!(hello, back);
    }

    #[test]
    fn acknowledge_round_trips() {
        let ack = AcknowledgeMessage {
            protocol_version: 0,
            receive_buffer_size: 8192,
            send_buffer_size: 8192,
            max_message_size: 0,
            max_chunk_count: 0,
        };
        let bytes = ack.encode_to_vec();
        let mut dec = Decoder::new(&bytes);
        assert_eq!(ack, AcknowledgeMessage::decode(&mut dec).unwrap());
    }
}
