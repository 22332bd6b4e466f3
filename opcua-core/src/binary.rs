//! Minimal binary codec traits.
//!
//! The full UA type dictionary and its binary codec are an external
//! collaborator (see crate docs); this module only provides the primitive
//! little-endian encode/decode this crate needs for the handful of
//! structures it understands itself — frame headers, `Hello`/`Acknowledge`/
//! `Error`, and the request/response headers.

use crate::status_code::StatusCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("truncated input")]
    Truncated,
    #[error("unknown type tag")]
    UnknownType,
    #[error("invalid encoding")]
    InvalidEncoding,
}

impl From<CodecError> for StatusCode {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Truncated => StatusCode::BadDecodingError,
            CodecError::UnknownType => StatusCode::BadDecodingError,
            CodecError::InvalidEncoding => StatusCode::BadEncodingError,
        }
    }
}

/// A cursor over a byte slice used while decoding the fixed structures this
/// crate knows about. Strings are length-prefixed by an `i32`, with `-1`
/// meaning null, per the OPC UA binary encoding rules.
pub struct Decoder<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Decoder { bytes, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        let bytes = self.take(1)?;
        Ok(bytes[0])
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        self.take(len)
    }

    /// Length-prefixed UTF-8 string; `-1` length decodes to an empty string,
    /// matching the "null string" convention of the wire format.
    pub fn read_string(&mut self) -> Result<String, CodecError> {
        let len = self.read_i32()?;
        if len < 0 {
            return Ok(String::new());
        }
        let bytes = self.take(len as usize)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidEncoding)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < len {
            return Err(CodecError::Truncated);
        }
        let out = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }
}

/// Little-endian encoder for the same handful of fixed structures.
#[derive(Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Encoder { buf: Vec::new() }
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.write_u32(v as u32);
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// `-1`-length-prefixed null string convention; empty string is encoded
    /// as a present, zero-length string (not null) since this crate never
    /// needs to distinguish the two for its own header fields.
    pub fn write_string(&mut self, s: &str) {
        self.write_i32(s.len() as i32);
        self.buf.extend_from_slice(s.as_bytes());
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

/// Implemented by the small set of structures this crate encodes itself.
pub trait BinaryEncodable {
    fn encode(&self, enc: &mut Encoder);

    fn encode_to_vec(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        self.encode(&mut enc);
        enc.into_vec()
    }
}

/// Implemented by the small set of structures this crate decodes itself.
pub trait BinaryDecodable: Sized {
    fn decode(dec: &mut Decoder) -> Result<Self, CodecError>;
}
