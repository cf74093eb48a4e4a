//! PKCE (Proof Key for Code Exchange) and nonce generation.
//!
//! Provides the crypto primitives for OAuth 2.0 authorization code flows:
//! - URL-safe random string generation (code verifiers, `state` nonces)
//! - S256 code challenge derivation using SHA-256
//! - Verification that a challenge matches a verifier

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::config::{STATE_BYTE_LENGTH, VERIFIER_BYTE_LENGTH};

/// PKCE challenge method constant.
const PKCE_METHOD: &str = "S256";

/// Generate a cryptographically random, URL-safe string.
///
/// Draws `byte_length` bytes from the OS CSPRNG and base64url-encodes them
/// without padding. CSPRNG unavailability is fatal and panics inside `rand`;
/// it is never reported as a recoverable error.
#[must_use]
pub fn random_url_safe(byte_length: usize) -> String {
    let mut bytes = vec![0u8; byte_length];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a fresh anti-CSRF `state` nonce.
#[must_use]
pub fn random_state() -> String {
    random_url_safe(STATE_BYTE_LENGTH)
}

/// Compute the SHA-256 digest of a string's bytes.
#[must_use]
pub fn sha256(input: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hasher.finalize().into()
}

/// PKCE (Proof Key for Code Exchange) data.
///
/// One pair exists per authorization attempt and must never be reused
/// across attempts; replay protection depends on freshness.
#[derive(Debug, Clone)]
pub struct Pkce {
    /// The code verifier (secret, used during token exchange).
    pub verifier: String,

    /// The code challenge (sent in the authorization URL).
    /// SHA-256 hash of the verifier, base64url encoded without padding.
    pub challenge: String,

    /// The challenge method (always "S256").
    pub method: &'static str,
}

impl Pkce {
    /// Generate a new PKCE verifier/challenge pair.
    #[must_use]
    pub fn generate() -> Self {
        let verifier = random_url_safe(VERIFIER_BYTE_LENGTH);
        let challenge = Self::compute_challenge(&verifier);

        Self {
            verifier,
            challenge,
            method: PKCE_METHOD,
        }
    }

    /// Verify that a challenge matches a verifier.
    #[must_use]
    pub fn verify(verifier: &str, challenge: &str) -> bool {
        Self::compute_challenge(verifier) == challenge
    }

    /// Compute the S256 challenge from a verifier.
    fn compute_challenge(verifier: &str) -> String {
        URL_SAFE_NO_PAD.encode(sha256(verifier))
    }
}
