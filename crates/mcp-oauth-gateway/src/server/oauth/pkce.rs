//! PKCE (Proof Key for Code Exchange) verification.
//!
//! Implements `S256` and `plain` code challenge verification per RFC 7636 §4.6.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

use super::types::CodeChallengeMethod;

/// Compute the `S256` challenge for a verifier: `BASE64URL(SHA256(verifier))`.
#[must_use]
pub fn s256_challenge(code_verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()))
}

/// Verify a PKCE `S256` code challenge.
pub fn verify_s256(code_verifier: &str, code_challenge: &str) -> bool {
    constant_time_eq(&s256_challenge(code_verifier), code_challenge)
}

/// Verify a verifier against a stored challenge using the stored method.
pub fn verify(method: CodeChallengeMethod, code_verifier: &str, code_challenge: &str) -> bool {
    match method {
        CodeChallengeMethod::S256 => verify_s256(code_verifier, code_challenge),
        CodeChallengeMethod::Plain => constant_time_eq(code_verifier, code_challenge),
    }
}

/// Constant-time string comparison.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
