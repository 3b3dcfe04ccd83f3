//! Opaque dual-token issuance and verification.
//!
//! Access tokens are short-lived and slide forward on every use; refresh
//! tokens are long-lived and only mint or revive access tokens. Both are
//! `{id}|{secret}` strings whose secret is stored hashed.

mod config;
mod issuer;
mod plaintext;
mod verifier;

use std::time::{SystemTime, UNIX_EPOCH};

pub use config::{DEFAULT_ACCESS_TTL, DEFAULT_REFRESH_TTL, TokenConfig};
pub use issuer::{MintedToken, TokenIssuer, TokenPair};
pub use plaintext::{PlaintextToken, SEPARATOR, format_token, generate_secret, hash_secret};
pub use verifier::{RenewalOutcome, TokenVerifier};

/// Errors raised while issuing or checking tokens.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token store error: {0}")]
    Store(#[from] sqlx::Error),
    #[error("system time error")]
    Clock,
}

/// Current Unix time in seconds.
pub fn now_secs() -> Result<i64, TokenError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .map_err(|_| TokenError::Clock)
}
