//! Security policy capability boundary.
//!
//! The cryptographic primitives backing a real security policy (RSA, AES,
//! SHA, X.509) are an external collaborator of this crate; `SecurityPolicy`
//! is the opaque capability C2 drives to sign/verify and encrypt/decrypt
//! chunks, and to size security headers.

use crate::errors::Error;

/// Pluggable sign/verify/encrypt/decrypt capability used by the secure
/// channel when framing outbound chunks and validating inbound ones.
pub trait SecurityPolicy: Send + Sync + std::fmt::Debug {
    /// Human-readable policy URI, e.g. `"http://opcfoundation.org/UA/SecurityPolicy#None"`.
    fn policy_uri(&self) -> &str;

    /// Sign (and, if the policy calls for it, encrypt) `chunk` in place.
    /// `plain_len` is the length of the portion preceding the trailing
    /// signature/padding that must be produced.
    fn sign_and_encrypt(&self, chunk: &mut Vec<u8>, plain_len: usize) -> Result<(), Error>;

    /// Verify and, if needed, decrypt `chunk` in place, returning the
    /// length of the recovered plaintext body (excluding signature/padding).
    fn verify_and_decrypt(&self, chunk: &mut [u8]) -> Result<usize, Error>;

    /// Bytes of security-header overhead added ahead of the body for an
    /// asymmetric (`OPN`) chunk.
    fn asymmetric_overhead(&self) -> usize;

    /// Bytes of security-header overhead added ahead of the body for a
    /// symmetric (`MSG`/`CLO`) chunk.
    fn symmetric_overhead(&self) -> usize;

    /// Whether this policy performs any signing/encryption at all. `None`
    /// short-circuits chunk sizing and leaves bytes untouched.
    fn is_no_op(&self) -> bool {
        false
    }
}

/// `SecurityPolicy::None`: chunks pass through unsigned and unencrypted.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpSecurityPolicy;

impl SecurityPolicy for NoOpSecurityPolicy {
    fn policy_uri(&self) -> &str {
        "http://opcfoundation.org/UA/SecurityPolicy#None"
    }

    fn sign_and_encrypt(&self, _chunk: &mut Vec<u8>, _plain_len: usize) -> Result<(), Error> {
        Ok(())
    }

    fn verify_and_decrypt(&self, chunk: &mut [u8]) -> Result<usize, Error> {
        Ok(chunk.len())
    }

    fn asymmetric_overhead(&self) -> usize {
        0
    }

    fn symmetric_overhead(&self) -> usize {
        0
    }

    fn is_no_op(&self) -> bool {
        true
    }
}
