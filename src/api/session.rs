//! Session endpoints.
//!
//! - POST `/login` - Verify credentials and issue a fresh token pair
//! - POST `/logout` - Revoke all of the caller's tokens and clear cookies
//! - GET `/me` - The authenticated principal

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{StatusCode, header::SET_COOKIE},
    middleware,
    response::{AppendHeaders, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::{ApiError, ResultExt};
use crate::auth::{Auth, AuthBackend, HasAuthBackend, OptionalAuth, discard_queued_cookies};
use crate::db::User;
use crate::impl_has_auth_backend;
use crate::principal::{dummy_password_hash, verify_password_blocking};
use crate::rate_limit::{RateLimitConfig, rate_limit_login};

#[derive(Clone)]
pub struct SessionState {
    pub auth: AuthBackend,
    pub rate_limit_config: Arc<RateLimitConfig>,
}

impl_has_auth_backend!(SessionState);

pub fn router(state: SessionState) -> Router {
    let login_router = Router::new()
        .route("/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_login,
        ));

    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(me))
        .with_state(state)
        .merge(login_router)
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    success: bool,
    message: &'static str,
    user: User,
}

#[derive(Serialize)]
struct MessageResponse {
    success: bool,
    message: &'static str,
}

fn invalid_credentials() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(MessageResponse {
            success: false,
            message: "Invalid credentials",
        }),
    )
        .into_response()
}

/// Verify email and password, then issue a new token pair as cookies.
/// Unknown accounts, wrong passwords and disabled accounts all fail the same way.
async fn login(
    State(state): State<SessionState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let backend = state.auth();

    let principal = backend
        .principals
        .find_by_identity(&payload.email)
        .await
        .db_err("Failed to look up user")?;

    let Some(principal) = principal else {
        verify_password_blocking(payload.password, dummy_password_hash().to_string()).await;
        info!("Login failed for unknown account");
        return Ok(invalid_credentials());
    };

    let valid = backend
        .principals
        .verify_secret(&principal, &payload.password)
        .await
        .db_err("Failed to verify password")?;

    if !valid || !principal.active {
        info!(user_id = principal.id, active = principal.active, "Login failed");
        return Ok(invalid_credentials());
    }

    let pair = backend
        .issuer
        .mint_pair(principal.id)
        .await
        .db_err("Failed to issue tokens")?;

    info!(user_id = principal.id, "User logged in");

    let cookies = &backend.cookies;
    Ok((
        StatusCode::OK,
        AppendHeaders([
            (SET_COOKIE, cookies.access_cookie(&pair.access.plaintext)),
            (SET_COOKIE, cookies.refresh_cookie(&pair.refresh.plaintext)),
        ]),
        Json(LoginResponse {
            success: true,
            message: "Login successful",
            user: principal,
        }),
    )
        .into_response())
}

/// Revoke every token of the caller and clear both cookies.
/// Succeeds without a session too, so stale cookies can always be cleared.
/// Fails with 500 if the revocation cannot be confirmed.
async fn logout(
    State(state): State<SessionState>,
    OptionalAuth(auth): OptionalAuth,
) -> Result<Response, ApiError> {
    let backend = state.auth();

    if let Some(auth) = auth {
        let revoked = backend
            .db
            .tokens()
            .delete_all_by_owner(auth.user_id())
            .await
            .db_err("Failed to revoke tokens")?;
        info!(user_id = auth.user_id(), revoked, "User logged out");
    }

    // Renewed cookies queued for this request would resurrect the session.
    discard_queued_cookies();

    let cookies = &backend.cookies;
    Ok((
        StatusCode::OK,
        AppendHeaders([
            (SET_COOKIE, cookies.clear_access_cookie()),
            (SET_COOKIE, cookies.clear_refresh_cookie()),
        ]),
        Json(MessageResponse {
            success: true,
            message: "Logged out",
        }),
    )
        .into_response())
}

#[derive(Serialize)]
struct MeResponse {
    user: User,
}

async fn me(Auth(auth): Auth) -> Json<MeResponse> {
    Json(MeResponse {
        user: auth.principal,
    })
}
