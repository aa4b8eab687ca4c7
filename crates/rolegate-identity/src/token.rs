//! Bearer-token hashing.
//!
//! Local access tokens are opaque random-hex strings; they are stored
//! and matched only as SHA-256 hex digests, never in plaintext.

use sha2::{Digest, Sha256};

/// SHA-256 hex digest of a bearer token.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_hex_and_deterministic() {
        let digest = hash_token("deadbeef");

        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(digest, hash_token("deadbeef"));
        assert_ne!(digest, hash_token("deadbeef2"));
    }
}
