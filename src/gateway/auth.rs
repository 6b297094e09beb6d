//! Bearer token checks for the gateway.

use sha2::{Digest, Sha256};

/// A configured gateway token, kept only as its SHA-256 digest.
#[derive(Clone)]
pub struct BearerToken {
    digest: [u8; 32],
}

impl BearerToken {
    /// Returns `None` for a blank token.
    pub fn new(token: &str) -> Option<Self> {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }
        Some(Self {
            digest: hash_token(token),
        })
    }

    /// Compare a presented token without leaking where it differs.
    pub fn matches(&self, candidate: &str) -> bool {
        constant_time_eq(&self.digest, &hash_token(candidate.trim()))
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BearerToken(***)")
    }
}

fn hash_token(token: &str) -> [u8; 32] {
    Sha256::digest(token.as_bytes()).into()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_token_is_no_token() {
        assert!(BearerToken::new("").is_none());
        assert!(BearerToken::new("   ").is_none());
    }

    #[test]
    fn matches_only_the_configured_token() {
        let token = BearerToken::new(" secret ").unwrap();
        assert!(token.matches("secret"));
        assert!(!token.matches("secre"));
        assert!(!token.matches("secret2"));
        assert!(!token.matches(""));
    }

    #[test]
    fn constant_time_eq_compares_bytes() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }

    #[test]
    fn debug_hides_the_token() {
        let token = BearerToken::new("secret").unwrap();
        assert_eq!(format!("{token:?}"), "BearerToken(***)");
    }
}
