//! C2 Secure Connection: channel parameters, sequence-number discipline and
//! token renewal. Chunk splitting/reassembly itself lives in [`super::chunker`],
//! which is built on top of the state tracked here.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::errors::Error;
use crate::security_policy::SecurityPolicy;

/// How long a previous token remains acceptable on inbound chunks after a
/// renewal commits a new one — bounds the race window documented in the
/// crate's design notes (a `MSG` chunk bearing the new token can arrive
/// before the client finishes processing the `OpenSecureChannelResponse`
/// that introduced it) instead of leaving it open indefinitely.
const TOKEN_RENEWAL_GRACE: Duration = Duration::from_secs(5);

/// `(channel_id, token_id)` plus the sequence-number and nonce state that
/// make up one secure channel generation.
///
/// Created empty (`channel_id == 0`); populated by a successful
/// `OpenSecureChannelResponse`; rotated on renewal; cleared on close or
/// transport failure.
#[derive(Clone)]
pub struct SecureChannel {
    channel_id: u32,
    token_id: u32,
    /// Set only during the renewal grace window: the previous token is
    /// still accepted on inbound chunks until the server could no longer be
    /// using it. See the crate's design notes on the token-renewal race —
    /// a `MSG` chunk bearing the new token can arrive before the client has
    /// finished processing the `OpenSecureChannelResponse` that introduced it.
    previous_token_id: Option<u32>,
    /// Set alongside `previous_token_id`; once passed, the previous token is
    /// no longer accepted even if still present.
    previous_token_deadline: Option<Instant>,
    security_policy: Arc<dyn SecurityPolicy>,
    local_seq: u32,
    remote_seq: u32,
    remote_seq_initialized: bool,
    local_nonce: Vec<u8>,
    remote_nonce: Vec<u8>,
    revised_lifetime_ms: u32,
}

impl SecureChannel {
    pub fn new(security_policy: Arc<dyn SecurityPolicy>) -> Self {
        SecureChannel {
            channel_id: 0,
            token_id: 0,
            previous_token_id: None,
            previous_token_deadline: None,
            security_policy,
            local_seq: 0,
            remote_seq: 0,
            remote_seq_initialized: false,
            local_nonce: Vec::new(),
            remote_nonce: Vec::new(),
            revised_lifetime_ms: 0,
        }
    }

    pub fn channel_id(&self) -> u32 {
        self.channel_id
    }

    pub fn token_id(&self) -> u32 {
        self.token_id
    }

    pub fn security_policy(&self) -> &Arc<dyn SecurityPolicy> {
        &self.security_policy
    }

    pub fn revised_lifetime_ms(&self) -> u32 {
        self.revised_lifetime_ms
    }

    pub fn remote_nonce(&self) -> &[u8] {
        &self.remote_nonce
    }

    /// Commit the parameters carried by a successful `OpenSecureChannelResponse`.
    /// The first call (channel_id was 0) establishes the channel; later
    /// calls are renewals and keep the outgoing token id as the previous one
    /// during the grace window.
    pub fn set_channel_params(
        &mut self,
        channel_id: u32,
        token_id: u32,
        revised_lifetime_ms: u32,
        remote_nonce: Vec<u8>,
    ) {
        if self.channel_id != 0 {
            self.previous_token_id = Some(self.token_id);
            self.previous_token_deadline = Some(Instant::now() + TOKEN_RENEWAL_GRACE);
        }
        self.channel_id = channel_id;
        self.token_id = token_id;
        self.revised_lifetime_ms = revised_lifetime_ms;
        self.remote_nonce = remote_nonce;
    }

    /// End the renewal grace window; call once the old token can no longer
    /// arrive (i.e. after its lifetime elapses). Also invoked lazily by
    /// [`Self::is_valid_token`] once `previous_token_deadline` has passed.
    pub fn expire_previous_token(&mut self) {
        self.previous_token_id = None;
        self.previous_token_deadline = None;
    }

    /// Clear all channel state on close or transport failure.
    pub fn clear(&mut self) {
        self.channel_id = 0;
        self.token_id = 0;
        self.previous_token_id = None;
        self.previous_token_deadline = None;
        self.local_seq = 0;
        self.remote_seq = 0;
        self.remote_seq_initialized = false;
        self.remote_nonce.clear();
    }

    /// A token id is acceptable on an inbound chunk if it matches the
    /// current token, or the previous one within the renewal grace window.
    /// Expires the previous token itself, lazily, the first time this is
    /// called after its deadline passes — so the grace window is actually
    /// time-bounded rather than open until the next renewal.
    pub fn is_valid_token(&mut self, token_id: u32) -> bool {
        if let Some(deadline) = self.previous_token_deadline {
            if Instant::now() >= deadline {
                self.expire_previous_token();
            }
        }
        token_id == self.token_id || self.previous_token_id == Some(token_id)
    }

    /// Allocate the next outbound sequence number, wrapping `u32::MAX` to `1`.
    pub fn next_local_sequence_number(&mut self) -> u32 {
        self.local_seq = if self.local_seq >= u32::MAX - 1 {
            1
        } else {
            self.local_seq + 1
        };
        self.local_seq
    }

    /// Validate and record an inbound sequence number. Strictly increasing,
    /// with the same wraparound convention as the local side; any
    /// regression is a fatal protocol error.
    pub fn validate_remote_sequence_number(&mut self, seq: u32) -> Result<(), Error> {
        if self.remote_seq_initialized {
            let expected_next = if self.remote_seq >= u32::MAX - 1 {
                1
            } else {
                self.remote_seq + 1
            };
            if seq != expected_next {
                return Err(Error::Protocol(format!(
                    "sequence number regression: expected {expected_next}, got {seq}"
                )));
            }
        }
        self.remote_seq = seq;
        self.remote_seq_initialized = true;
        Ok(())
    }
}

impl std::fmt::Debug for SecureChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureChannel")
            .field("channel_id", &self.channel_id)
            .field("token_id", &self.token_id)
            .field("previous_token_id", &self.previous_token_id)
            .field("local_seq", &self.local_seq)
            .field("remote_seq", &self.remote_seq)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security_policy::NoOpSecurityPolicy;

    fn channel() -> SecureChannel {
        SecureChannel::new(Arc::new(NoOpSecurityPolicy))
    }

    #[test]
    fn accepts_strictly_increasing_sequence_numbers() {
        let mut c = channel();
        assert!(c.validate_remote_sequence_number(42).is_ok());
        assert!(c.validate_remote_sequence_number(43).is_ok());
        assert!(c.validate_remote_sequence_number(44).is_ok());
    }

    #[test]
    fn rejects_sequence_regression() {
        let mut c = channel();
        c.validate_remote_sequence_number(10).unwrap();
        assert!(c.validate_remote_sequence_number(9).is_err());
    }

    #[test]
    fn local_sequence_wraps_at_u32_max() {
        let mut c = channel();
        c.local_seq = u32::MAX - 1;
        assert_eq!(c.next_local_sequence_number(), 1);
    }

    #[test]
    fn accepts_previous_token_during_renewal_window() {
        let mut c = channel();
        c.set_channel_params(1, 100, 3600_000, vec![]);
        assert!(c.is_valid_token(100));
        c.set_channel_params(1, 200, 3600_000, vec![]);
        assert!(c.is_valid_token(200));
        assert!(c.is_valid_token(100));
        c.expire_previous_token();
        assert!(!c.is_valid_token(100));
    }
}
