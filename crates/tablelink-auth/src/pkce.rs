//! PKCE (Proof Key for Code Exchange) implementation per RFC 7636.
//!
//! Generates the code verifier and S256 challenge used during the OAuth
//! authorization flow. The verifier stays local and is sent only during
//! token exchange; the challenge travels in the authorization URL so the
//! authorization server can verify both requests came from the same party.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng as _;
use sha2::{Digest, Sha256};

use crate::error::{AuthError, AuthResult};

/// Number of random bytes in a code verifier (256 bits of entropy).
const VERIFIER_BYTES: usize = 32;

/// Number of random bytes in a CSRF state value.
const STATE_BYTES: usize = 16;

/// Generates a cryptographically random PKCE code verifier.
///
/// 32 random bytes encoded as URL-safe base64 without padding, yielding a
/// 43-character string in `[A-Za-z0-9_-]`.
pub fn generate_code_verifier() -> String {
    let mut bytes = [0u8; VERIFIER_BYTES];
    rand::rng().fill(&mut bytes[..]);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Computes the S256 code challenge for a verifier.
///
/// `challenge = BASE64URL(SHA256(ASCII(verifier)))`
///
/// # Errors
///
/// Returns a `PkceFormat` error if the verifier contains characters outside
/// the base64url alphabet; the verifier is validated before hashing.
pub fn generate_code_challenge(verifier: &str) -> AuthResult<String> {
    if verifier.is_empty() || !verifier.chars().all(is_base64url_char) {
        return Err(AuthError::pkce_format(
            "code verifier must be a non-empty base64url string ([A-Za-z0-9_-])",
        ));
    }
    let digest = Sha256::digest(verifier.as_bytes());
    Ok(URL_SAFE_NO_PAD.encode(digest))
}

/// Generates a random state value for CSRF protection.
pub fn generate_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    rand::rng().fill(&mut bytes[..]);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn is_base64url_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}
