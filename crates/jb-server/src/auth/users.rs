//! Password users

use std::collections::HashMap;

use jb_core::config::UserEntry;
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `password`, as stored in the config
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Password hashes by login name
#[derive(Debug, Default)]
pub struct UserCredentials {
    hashes: HashMap<String, String>,
}

impl UserCredentials {
    pub fn new(entries: &[UserEntry]) -> Self {
        let hashes = entries
            .iter()
            .map(|entry| (entry.name.clone(), entry.password_sha256.to_ascii_lowercase()))
            .collect();
        Self { hashes }
    }

    /// Check a login attempt
    pub fn verify(&self, user: &str, password: &str) -> bool {
        let Some(expected) = self.hashes.get(user) else {
            return false;
        };
        let actual = hash_password(password);
        // compare every byte so timing does not depend on the first mismatch
        expected.len() == actual.len()
            && expected
                .bytes()
                .zip(actual.bytes())
                .fold(0u8, |diff, (a, b)| diff | (a ^ b))
                == 0
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_password() {
        assert_eq!(
            hash_password("password"),
            "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8"
        );
    }

    #[test]
    fn test_verify() {
        let users = UserCredentials::new(&[UserEntry {
            name: "alice".into(),
            password_sha256: "5E884898DA28047151D0E56F8DC6292773603D0D6AABBDD62A11EF721D1542D8"
                .into(),
        }]);
        assert_eq!(users.len(), 1);
        assert!(users.verify("alice", "password"));
        assert!(!users.verify("alice", "Password"));
        assert!(!users.verify("bob", "password"));
    }
}
