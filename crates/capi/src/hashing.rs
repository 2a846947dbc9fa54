//! One-way hashing gate for personal data.
//!
//! `HashedValue` can only be produced here, so any field typed with it is
//! guaranteed to leave the process hashed.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Lower-case hex SHA-256 digest of a normalized value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct HashedValue(String);

impl HashedValue {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn digest(normalized: &str) -> HashedValue {
    HashedValue(hex::encode(Sha256::digest(normalized.as_bytes())))
}

/// Hash after trimming and lower-casing. Blank input yields `None`.
pub fn hash_normalized(raw: &str) -> Option<HashedValue> {
    let normalized = raw.trim().to_lowercase();
    if normalized.is_empty() {
        return None;
    }
    Some(digest(&normalized))
}

/// Postal codes are hashed on their digits only.
pub fn hash_zip(raw: &str) -> Option<HashedValue> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    Some(digest(&digits))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        // sha256("test@example.com")
        assert_eq!(
            hash_normalized("  Test@Example.COM ").map(|h| h.as_str().to_string()),
            Some("973dfe463ec85785f5f95af5ba3906eedb2d931c24e69824a89ea65dba4e813b".into())
        );
    }

    #[test]
    fn test_normalization_is_applied_before_hashing() {
        assert_eq!(hash_normalized("SP"), hash_normalized(" sp"));
        assert_ne!(hash_normalized("sp"), hash_normalized("rj"));
    }

    #[test]
    fn test_zip_digits_only() {
        assert_eq!(hash_zip("01000-000"), hash_zip("01000000"));
        assert_eq!(hash_zip("01000000"), hash_normalized("01000000"));
        assert_eq!(hash_zip("n/a"), None);
    }

    #[test]
    fn test_blank_values_are_dropped() {
        assert_eq!(hash_normalized("   "), None);
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let hashed = hash_normalized("br").into_iter().next();
        let json = serde_json::to_value(hashed).unwrap_or_default();
        assert!(json.as_str().is_some_and(|s| s.len() == 64));
    }
}
