//! PKCE (RFC 7636) challenge generation.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Number of random bytes behind the code verifier (encodes to 64 chars,
/// inside RFC 7636's 43-128 range).
const VERIFIER_BYTES: usize = 48;

/// PKCE code verifier and its S256 challenge.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    verifier: String,
    challenge: String,
}

impl PkceChallenge {
    /// Generates a fresh verifier/challenge pair.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let random_bytes: Vec<u8> = (0..VERIFIER_BYTES).map(|_| rng.r#gen::<u8>()).collect();
        let verifier = URL_SAFE_NO_PAD.encode(random_bytes);
        let challenge = Self::challenge_for(&verifier);
        Self {
            verifier,
            challenge,
        }
    }

    /// SHA-256 challenge for a given verifier, base64url-encoded.
    fn challenge_for(verifier: &str) -> String {
        let digest = Sha256::digest(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }

    /// The code verifier, sent with the token exchange.
    #[must_use]
    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    /// The code challenge, sent on the authorization URL.
    #[must_use]
    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    /// The challenge method; always `S256`.
    #[must_use]
    pub const fn method(&self) -> &'static str {
        "S256"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verifier_length_in_rfc_range() {
        let pkce = PkceChallenge::generate();
        assert!(pkce.verifier().len() >= 43);
        assert!(pkce.verifier().len() <= 128);
    }

    #[test]
    fn test_challenge_is_deterministic_per_verifier() {
        assert_eq!(
            PkceChallenge::challenge_for("fixed"),
            PkceChallenge::challenge_for("fixed"),
        );
        assert_ne!(
            PkceChallenge::challenge_for("one"),
            PkceChallenge::challenge_for("two"),
        );
    }

    #[test]
    fn test_generations_are_unique() {
        let a = PkceChallenge::generate();
        let b = PkceChallenge::generate();
        assert_ne!(a.verifier(), b.verifier());
        assert_ne!(a.challenge(), b.challenge());
        assert_ne!(a.verifier(), a.challenge());
    }
}
