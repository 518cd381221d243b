//! Random token generation, secret hashing and PKCE verification

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Generates a 256-bit random value encoded as base64url without padding.
/// Used for access tokens, refresh tokens, authorization codes and client
/// secrets.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generates a client id: shorter than a token since it is not a secret
pub fn generate_client_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hex-encoded SHA-256 of a client secret
pub fn hash_secret(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Compares a presented secret with a stored hash without short-circuiting
/// on the first differing byte
pub fn verify_secret(secret: &str, stored_hash: &str) -> bool {
    if stored_hash.is_empty() {
        return false;
    }
    constant_time_eq(hash_secret(secret).as_bytes(), stored_hash.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Supported `code_challenge_method` values
pub fn is_supported_challenge_method(method: &str) -> bool {
    matches!(method, "S256" | "plain")
}

/// Checks a PKCE `code_verifier` against the recorded challenge.
/// A missing method means `plain`.
pub fn verify_pkce(challenge: &str, method: Option<&str>, verifier: &str) -> bool {
    let expected = match method.unwrap_or("plain") {
        "S256" => URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes())),
        "plain" => verifier.to_string(),
        _ => return false,
    };
    constant_time_eq(expected.as_bytes(), challenge.as_bytes())
}
