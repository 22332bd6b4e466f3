//! In-memory transport configuration.
//!
//! Loading this from a file or the command line is out of scope here; the
//! embedding application constructs it programmatically.

/// Buffer-size and framing limits advertised in the `Hello` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub receive_buffer_size: u32,
    pub send_buffer_size: u32,
    pub max_message_size: u32,
    pub max_chunk_count: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            receive_buffer_size: 65536,
            send_buffer_size: 65536,
            max_message_size: 0,
            max_chunk_count: 0,
        }
    }
}

impl TransportConfig {
    /// Validate the configuration. Buffer sizes of zero make chunking impossible.
    pub fn validate(&self) -> Result<(), String> {
        if self.receive_buffer_size == 0 {
            return Err("receive_buffer_size must be non-zero".into());
        }
        if self.send_buffer_size == 0 {
            return Err("send_buffer_size must be non-zero".into());
        }
        Ok(())
    }

    /// Negotiate effective buffer sizes against the server's `Acknowledge`,
    /// per the minimum-of-both-sides rule.
    pub fn negotiate(&self, ack_receive: u32, ack_send: u32) -> (u32, u32) {
        (
            self.send_buffer_size.min(ack_receive),
            self.receive_buffer_size.min(ack_send),
        )
    }
}
