//! Public verification tokens and URLs.
//!
//! Verification tokens live in their own namespace: 16 lowercase hex
//! characters, while internal certificate IDs are hyphenated UUIDs. The two
//! are served by separate lookups, so a token is never guessed from its shape
//! to decide which table to hit.

use uuid::Uuid;

pub const VERIFICATION_ID_LEN: usize = 16;

/// Fresh verification token drawn from a random v4 UUID.
///
/// Collisions are caught by the unique index on `certificates.verification_id`,
/// not here.
pub fn generate_verification_id() -> String {
    Uuid::new_v4().simple().to_string()[..VERIFICATION_ID_LEN].to_string()
}

pub fn is_verification_id(candidate: &str) -> bool {
    candidate.len() == VERIFICATION_ID_LEN
        && candidate
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

pub fn verification_url(base_url: &str, verification_id: &str) -> String {
    format!("{}/verify/{}", base_url.trim_end_matches('/'), verification_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn token_shape() {
        let token = generate_verification_id();
        assert_eq!(token.len(), 16);
        assert!(is_verification_id(&token));
        assert!(!token.contains('-'));
    }

    #[test]
    fn no_duplicates_over_100k_tokens() {
        let mut seen = HashSet::with_capacity(100_000);
        for _ in 0..100_000 {
            assert!(seen.insert(generate_verification_id()));
        }
    }

    #[test]
    fn rejects_internal_ids_and_garbage() {
        assert!(!is_verification_id(&Uuid::new_v4().to_string()));
        assert!(!is_verification_id("ABCDEF0123456789"));
        assert!(!is_verification_id("abc123"));
        assert!(!is_verification_id("../../etc/passwd"));
        assert!(!is_verification_id(""));
    }

    #[test]
    fn url_joins_base_and_token() {
        assert_eq!(
            verification_url("https://certs.example.org/", "0123456789abcdef"),
            "https://certs.example.org/verify/0123456789abcdef"
        );
        assert_eq!(
            verification_url("http://localhost:5001", "0123456789abcdef"),
            "http://localhost:5001/verify/0123456789abcdef"
        );
    }
}
