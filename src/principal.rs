//! Principal lookup and password verification.
//!
//! Token code only needs to find an account and check its password, so that
//! is all [`PrincipalStore`] exposes. The SQLite [`UserStore`] is the
//! production implementation.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use async_trait::async_trait;
use std::sync::OnceLock;
use tracing::error;

use crate::db::{User, UserStore};
use crate::tokens::generate_secret;

/// The authenticated identity a token represents.
pub type Principal = User;

/// Lookup seam for accounts.
#[async_trait]
pub trait PrincipalStore: Send + Sync {
    /// Find a principal by login identity (email).
    async fn find_by_identity(&self, identity: &str) -> Result<Option<Principal>, sqlx::Error>;

    /// Find a principal by its internal id (token owner).
    async fn find_by_id(&self, id: i64) -> Result<Option<Principal>, sqlx::Error>;

    /// Check a plaintext password against the principal's stored hash.
    async fn verify_secret(&self, principal: &Principal, secret: &str)
    -> Result<bool, sqlx::Error>;
}

#[async_trait]
impl PrincipalStore for UserStore {
    async fn find_by_identity(&self, identity: &str) -> Result<Option<Principal>, sqlx::Error> {
        self.get_by_email(identity.trim()).await
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Principal>, sqlx::Error> {
        self.get_by_id(id).await
    }

    async fn verify_secret(
        &self,
        principal: &Principal,
        secret: &str,
    ) -> Result<bool, sqlx::Error> {
        let Some(hash) = self.get_password_hash(principal.id).await? else {
            return Ok(false);
        };
        Ok(verify_password_blocking(secret.to_string(), hash).await)
    }
}

/// Hash a password for storage using Argon2id with a random salt.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a PHC-formatted Argon2 hash.
/// A malformed stored hash counts as a mismatch.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(parsed) => parsed,
        Err(e) => {
            error!(error = %e, "Stored password hash is malformed");
            return false;
        }
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// A valid hash of an unguessable password. Verifying against it costs the
/// same as a real verification, so unknown identities are not distinguishable
/// by timing.
pub fn dummy_password_hash() -> &'static str {
    static DUMMY: OnceLock<String> = OnceLock::new();
    DUMMY.get_or_init(|| {
        hash_password(&generate_secret()).unwrap_or_else(|e| {
            error!(error = %e, "Failed to prepare dummy password hash");
            String::new()
        })
    })
}

/// Run [`verify_password`] off the async executor.
pub async fn verify_password_blocking(password: String, hash: String) -> bool {
    match tokio::task::spawn_blocking(move || verify_password(&password, &hash)).await {
        Ok(valid) => valid,
        Err(e) => {
            error!(error = %e, "Password verification task failed");
            false
        }
    }
}
