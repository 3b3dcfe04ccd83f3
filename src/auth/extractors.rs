//! Axum extractors for authentication.
//!
//! These only look at the `Authorization: Bearer` header. Cookie-based
//! sessions reach them through the renewal middleware, which injects that
//! header.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use tracing::{error, info};

use super::errors::{ApiAuthError, AuthErrorKind};
use super::renewal::SessionUnverified;
use super::state::{AuthBackend, HasAuthBackend};
use super::types::AuthenticatedUser;

/// The token from an `Authorization: Bearer` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim()).filter(|token| !token.is_empty())
}

/// Core authentication logic shared by the extractors.
async fn authenticate_request(
    parts: &Parts,
    backend: &AuthBackend,
) -> Result<AuthenticatedUser, AuthErrorKind> {
    let token = bearer_token(&parts.headers).ok_or(AuthErrorKind::NotAuthenticated)?;

    let record = backend
        .verifier
        .authenticate_bearer(token)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to check access token");
            AuthErrorKind::DatabaseError
        })?
        .ok_or(AuthErrorKind::InvalidToken)?;

    let principal = backend
        .principals
        .find_by_id(record.owner_id)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to get user");
            AuthErrorKind::DatabaseError
        })?
        .ok_or(AuthErrorKind::UserNotFound)?;

    if !principal.active {
        match backend.db.tokens().delete_all_by_owner(principal.id).await {
            Ok(revoked) => info!(
                user_id = principal.id,
                revoked, "Revoked tokens of disabled account"
            ),
            Err(e) => error!(
                user_id = principal.id,
                error = %e,
                "Failed to revoke tokens of disabled account"
            ),
        }
        return Err(AuthErrorKind::AccountInactive);
    }

    Ok(AuthenticatedUser {
        principal,
        token_id: record.id,
    })
}

/// Extractor for endpoints that require authentication.
/// Returns JSON errors.
pub struct Auth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for Auth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        authenticate_request(parts, state.auth())
            .await
            .map(Auth)
            .map_err(ApiAuthError::from)
    }
}

/// Optional authentication extractor for endpoints that work both
/// authenticated and unauthenticated.
///
/// Missing or invalid credentials yield `None`. A store failure, including
/// one hit while the renewal middleware checked the cookies, is rejected
/// with 500 since the caller's session state is unknown.
pub struct OptionalAuth(pub Option<AuthenticatedUser>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if parts.extensions.get::<SessionUnverified>().is_some() {
            return Err(AuthErrorKind::DatabaseError.into());
        }
        match authenticate_request(parts, state.auth()).await {
            Ok(user) => Ok(OptionalAuth(Some(user))),
            Err(AuthErrorKind::DatabaseError) => Err(AuthErrorKind::DatabaseError.into()),
            Err(_) => Ok(OptionalAuth(None)),
        }
    }
}
