mod error;
mod session;
mod tokens;

use axum::Router;
use std::sync::Arc;

use crate::auth::AuthBackend;
use crate::rate_limit::RateLimitConfig;

/// Mount point of the API router.
pub const API_PREFIX: &str = "/api/v1";

/// Full path of the login endpoint.
pub const LOGIN_PATH: &str = "/api/v1/login";

/// Create the API router, relative to [`API_PREFIX`].
pub fn create_api_router(auth: AuthBackend, rate_limit_config: Arc<RateLimitConfig>) -> Router {
    let session_state = session::SessionState {
        auth: auth.clone(),
        rate_limit_config,
    };

    let tokens_state = tokens::TokensState { auth };

    Router::new()
        .merge(session::router(session_state))
        .nest("/tokens", tokens::router(tokens_state))
}
