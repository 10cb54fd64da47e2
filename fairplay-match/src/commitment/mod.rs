use fairplay_core::Commitment;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;

const SECRET_BYTES: usize = 32;

/// `SHA-256(UTF8(move_label) || UTF8(secret))`
pub fn commit(move_label: &str, secret: &str) -> Commitment {
    let mut hasher = Sha256::new();
    hasher.update(move_label.as_bytes());
    hasher.update(secret.as_bytes());
    Commitment::new(hasher.finalize().into())
}

pub fn verify(commitment: &Commitment, move_label: &str, secret: &str) -> bool {
    commit(move_label, secret) == *commitment
}

/// Per-commit secret: 32 bytes from the OS RNG, hex encoded.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn generate() -> Self {
        let mut bytes = [0u8; SECRET_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let secret = Self(hex::encode(bytes));
        bytes.fill(0);
        secret
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl From<String> for Secret {
    fn from(secret: String) -> Self {
        Self(secret)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        let mut bytes = std::mem::take(&mut self.0).into_bytes();
        bytes.fill(0);
        std::hint::black_box(&bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_vector() {
        // sha256("Rockabc")
        let expected = Sha256::digest(b"Rockabc");
        assert_eq!(commit("Rock", "abc").as_bytes()[..], expected[..]);
    }

    #[test]
    fn test_verify() {
        let secret = Secret::generate();
        let c = commit("Paper", secret.expose());
        assert!(verify(&c, "Paper", secret.expose()));
        assert!(!verify(&c, "Rock", secret.expose()));
        assert!(!verify(&c, "Paper", "wrong secret"));
    }

    #[test]
    fn test_secrets_are_fresh() {
        let a = Secret::generate();
        let b = Secret::generate();
        assert_ne!(a, b);
        assert_eq!(a.expose().len(), SECRET_BYTES * 2);
        assert_ne!(commit("Rock", a.expose()), commit("Rock", b.expose()));
    }

    #[test]
    fn test_secret_debug_redacted() {
        let secret = Secret::from("hunter2".to_string());
        assert!(!format!("{:?}", secret).contains("hunter2"));
    }

    proptest! {
        #[test]
        fn commit_is_deterministic(label in "[A-Za-z]{1,12}", secret in ".{0,64}") {
            prop_assert_eq!(commit(&label, &secret), commit(&label, &secret));
        }

        #[test]
        fn distinct_secrets_give_distinct_commitments(
            label in "Rock|Paper|Scissors",
            a in "[0-9a-f]{32}",
            b in "[0-9a-f]{32}",
        ) {
            prop_assume!(a != b);
            prop_assert_ne!(commit(&label, &a), commit(&label, &b));
        }
    }
}
