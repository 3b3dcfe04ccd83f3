//! Plaintext token format: `{id}|{secret}`.
//!
//! The numeric id allows a direct primary-key lookup, and the secret is only
//! ever compared through its SHA-256 hash.

use rand::distr::{Alphanumeric, SampleString};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Separator between the record id and the secret.
pub const SEPARATOR: char = '|';

/// Length of the random secret portion.
pub const SECRET_LENGTH: usize = 40;

/// Percent-encoded separator, accepted from clients that URL-encode cookie values.
const ENCODED_SEPARATOR: &str = "%7C";

/// A parsed plaintext token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaintextToken<'a> {
    pub id: i64,
    pub secret: &'a str,
}

impl<'a> PlaintextToken<'a> {
    /// Split a token into id and secret.
    /// Returns None for a missing separator, non-numeric id or empty secret.
    pub fn parse(raw: &'a str) -> Option<Self> {
        let (id, secret) = match raw.split_once(SEPARATOR) {
            Some(parts) => parts,
            None => {
                let at = raw
                    .find(ENCODED_SEPARATOR)
                    .or_else(|| raw.find("%7c"))?;
                (&raw[..at], &raw[at + ENCODED_SEPARATOR.len()..])
            }
        };

        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) || secret.is_empty() {
            return None;
        }
        let id = id.parse().ok()?;

        Some(Self { id, secret })
    }
}

/// Join a record id and secret into the plaintext handed to the client.
pub fn format_token(id: i64, secret: &str) -> String {
    format!("{id}{SEPARATOR}{secret}")
}

/// Generate a fresh random secret.
pub fn generate_secret() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), SECRET_LENGTH)
}

/// Hex-encoded SHA-256 of a secret, as stored in the token table.
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compare a presented secret against a stored hash in constant time.
pub fn secret_matches(secret: &str, stored_hash: &str) -> bool {
    let candidate = hash_secret(secret);
    bool::from(candidate.as_bytes().ct_eq(stored_hash.as_bytes()))
}
