//! C3: PKCE S256 challenge derivation and comparison.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use sha2::{Digest, Sha256};

/// `BASE64URL(SHA256(verifier))` with `=` padding stripped.
pub fn derive_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Compares a `code_verifier` against a stored `code_challenge`. Only S256
/// is supported; callers must reject any other `code_challenge_method`
/// before calling this.
pub fn verify_challenge(verifier: &str, stored_challenge: &str) -> bool {
    derive_challenge(verifier) == stored_challenge
}
