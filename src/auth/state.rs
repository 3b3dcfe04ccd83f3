//! Shared authentication backend and the state trait extractors rely on.

use std::sync::Arc;

use super::cookie::CookieCodec;
use crate::db::Database;
use crate::principal::PrincipalStore;
use crate::tokens::{TokenConfig, TokenIssuer, TokenVerifier};

/// Everything the renewal middleware, extractors and session handlers need.
#[derive(Clone)]
pub struct AuthBackend {
    pub db: Database,
    pub issuer: TokenIssuer,
    pub verifier: TokenVerifier,
    pub principals: Arc<dyn PrincipalStore>,
    pub cookies: Arc<CookieCodec>,
}

impl AuthBackend {
    /// Wire issuer and verifier over the database, using its user table as
    /// the principal store.
    pub fn new(db: Database, config: TokenConfig, cookie_prefix: &str, secure: bool) -> Self {
        let principals: Arc<dyn PrincipalStore> = Arc::new(db.users());
        Self::with_principals(db, config, cookie_prefix, secure, principals)
    }

    pub fn with_principals(
        db: Database,
        config: TokenConfig,
        cookie_prefix: &str,
        secure: bool,
        principals: Arc<dyn PrincipalStore>,
    ) -> Self {
        let cookies = Arc::new(CookieCodec::new(cookie_prefix, secure, &config));
        let config = Arc::new(config);
        let issuer = TokenIssuer::new(db.tokens(), config.clone());
        let verifier = TokenVerifier::new(db.tokens(), issuer.clone(), principals.clone(), config);
        Self {
            db,
            issuer,
            verifier,
            principals,
            cookies,
        }
    }
}

/// Trait for state types that provide the authentication backend.
pub trait HasAuthBackend {
    fn auth(&self) -> &AuthBackend;
}

impl HasAuthBackend for AuthBackend {
    fn auth(&self) -> &AuthBackend {
        self
    }
}

/// Implement `HasAuthBackend` for a state struct with an `auth: AuthBackend` field.
///
/// # Example
/// ```ignore
/// use crate::impl_has_auth_backend;
///
/// #[derive(Clone)]
/// pub struct MyState {
///     pub auth: AuthBackend,
///     // ... other fields
/// }
///
/// impl_has_auth_backend!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_auth_backend {
    ($state_type:ty) => {
        impl $crate::auth::HasAuthBackend for $state_type {
            fn auth(&self) -> &$crate::auth::AuthBackend {
                &self.auth
            }
        }
    };
}
