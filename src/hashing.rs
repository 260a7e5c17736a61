// Content hashing for rendered and uploaded artifacts
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 digest of `bytes` (64 lowercase characters).
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Re-hash `bytes` and compare against a previously stored digest.
pub fn hash_matches(bytes: &[u8], expected: &str) -> bool {
    sha256_hex(bytes).eq_ignore_ascii_case(expected.trim())
}
