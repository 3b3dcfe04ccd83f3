//! Token management API endpoints.
//!
//! - GET `/` - List live tokens for current user
//! - DELETE `/{id}` - Revoke specific token (own token or admin)

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get},
};
use serde::Serialize;
use tracing::info;

use super::error::{ApiError, ResultExt};
use crate::auth::{Auth, AuthBackend};
use crate::db::TokenKind;
use crate::impl_has_auth_backend;
use crate::tokens::now_secs;

#[derive(Clone)]
pub struct TokensState {
    pub auth: AuthBackend,
}

impl_has_auth_backend!(TokensState);

pub fn router(state: TokensState) -> Router {
    Router::new()
        .route("/", get(list_tokens))
        .route("/{id}", delete(revoke_token))
        .with_state(state)
}

#[derive(Serialize)]
struct TokenInfo {
    id: i64,
    kind: TokenKind,
    created_at: i64,
    last_used_at: Option<i64>,
    expires_at: i64,
    is_current: bool,
}

#[derive(Serialize)]
struct ListTokensResponse {
    tokens: Vec<TokenInfo>,
}

/// List all live tokens for the current user.
/// The access token authenticating this request is marked as current.
async fn list_tokens(
    State(state): State<TokensState>,
    Auth(auth): Auth,
) -> Result<impl IntoResponse, ApiError> {
    let now = now_secs().db_err("Failed to read clock")?;
    let tokens = state
        .auth
        .db
        .tokens()
        .list_by_owner(auth.user_id(), now)
        .await
        .db_err("Failed to list tokens")?;

    let tokens = tokens
        .into_iter()
        .map(|t| TokenInfo {
            is_current: t.id == auth.token_id,
            id: t.id,
            kind: t.kind,
            created_at: t.created_at,
            last_used_at: t.last_used_at,
            expires_at: t.expires_at,
        })
        .collect();

    Ok((StatusCode::OK, Json(ListTokensResponse { tokens })))
}

#[derive(Serialize)]
struct RevokeResponse {
    revoked: bool,
}

/// Revoke a specific token by ID.
/// Users can revoke their own tokens, admins can revoke any token.
async fn revoke_token(
    State(state): State<TokensState>,
    Auth(auth): Auth,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let tokens = state.auth.db.tokens();
    let token = tokens
        .get_by_id(id)
        .await
        .db_err("Failed to get token")?
        .ok_or_else(|| ApiError::not_found("Token not found"))?;

    if token.owner_id != auth.user_id() && !auth.is_admin() {
        return Err(ApiError::forbidden("Cannot revoke another user's token"));
    }

    let revoked = tokens.delete(id).await.db_err("Failed to revoke token")?;
    if revoked {
        info!(token_id = id, owner_id = token.owner_id, by = auth.user_id(), "Token revoked");
    }

    Ok((StatusCode::OK, Json(RevokeResponse { revoked })))
}
