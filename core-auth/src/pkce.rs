//! PKCE (RFC 7636) challenge generation
//!
//! The verifier is 32 bytes from the operating system's secure random source.
//! The challenge sent on the authorization redirect is the base64url (no
//! padding) SHA-256 digest of those bytes; the verifier itself travels as
//! base64url text so it can be persisted across the redirect round trip.

use crate::error::{AuthError, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::fmt;

/// Number of random bytes in a verifier.
pub const VERIFIER_BYTES: usize = 32;

/// The only supported challenge method.
pub const CHALLENGE_METHOD: &str = "S256";

/// A verifier/challenge pair for one authorization attempt.
#[derive(Clone, PartialEq, Eq)]
pub struct PkceChallenge {
    verifier: String,
    challenge: String,
}

impl PkceChallenge {
    /// Generate a fresh pair.
    ///
    /// Fails with [`AuthError::EntropyUnavailable`] when the secure random
    /// source cannot be read.
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; VERIFIER_BYTES];
        getrandom::getrandom(&mut bytes)
            .map_err(|e| AuthError::EntropyUnavailable(e.to_string()))?;
        Ok(Self::from_bytes(&bytes))
    }

    /// Derive the pair from known verifier bytes.
    pub fn from_bytes(bytes: &[u8; VERIFIER_BYTES]) -> Self {
        let digest = Sha256::digest(bytes);
        Self {
            verifier: URL_SAFE_NO_PAD.encode(bytes),
            challenge: URL_SAFE_NO_PAD.encode(digest),
        }
    }

    /// Rebuild the pair from a persisted verifier.
    ///
    /// Returns `None` when the text is not a base64url encoding of
    /// [`VERIFIER_BYTES`] bytes.
    pub fn from_verifier(verifier: &str) -> Option<Self> {
        let decoded = URL_SAFE_NO_PAD.decode(verifier).ok()?;
        let bytes: [u8; VERIFIER_BYTES] = decoded.try_into().ok()?;
        Some(Self::from_bytes(&bytes))
    }

    /// Verifier material, base64url-encoded.
    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    /// `base64url(SHA-256(verifier bytes))`
    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    pub fn method(&self) -> &'static str {
        CHALLENGE_METHOD
    }
}

impl fmt::Debug for PkceChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkceChallenge")
            .field("verifier", &"[REDACTED]")
            .field("challenge", &self.challenge)
            .field("method", &CHALLENGE_METHOD)
            .finish()
    }
}
