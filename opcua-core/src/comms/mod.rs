pub mod chunker;
pub mod message_chunk;
pub mod secure_channel;
pub mod tcp_codec;
pub mod tcp_types;
pub mod url;
