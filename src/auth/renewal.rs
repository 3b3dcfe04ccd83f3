//! Silent session renewal.
//!
//! `renew_session` turns the cookie pair into an `Authorization: Bearer`
//! header for downstream extractors, renewing the access token through the
//! refresh token when needed. Renewed cookies are not written directly;
//! they are queued in a task-local and appended by `attach_queued_cookies`
//! once the inner service has produced its response, so streamed bodies get
//! them too.

use std::cell::RefCell;

use axum::{
    extract::{Request, State},
    http::{HeaderValue, header},
    middleware::Next,
    response::Response,
};
use tracing::{debug, error, warn};

use super::state::AuthBackend;
use crate::tokens::RenewalOutcome;

tokio::task_local! {
    /// Set-Cookie values waiting to be attached to the current response.
    static PENDING_COOKIES: RefCell<Vec<HeaderValue>>;
}

/// Queue a `Set-Cookie` value for the current response.
///
/// Returns false if the value is not a valid header or the request is not
/// running inside [`attach_queued_cookies`].
pub fn queue_cookie(cookie: &str) -> bool {
    let Ok(value) = HeaderValue::from_str(cookie) else {
        warn!("Dropping cookie with invalid header characters");
        return false;
    };
    PENDING_COOKIES
        .try_with(|cell| cell.borrow_mut().push(value))
        .is_ok()
}

/// Drop everything queued so far for the current response.
pub fn discard_queued_cookies() {
    let _ = PENDING_COOKIES.try_with(|cell| cell.borrow_mut().clear());
}

/// Outer middleware owning the per-request cookie queue.
pub async fn attach_queued_cookies(request: Request, next: Next) -> Response {
    PENDING_COOKIES
        .scope(RefCell::new(Vec::new()), async move {
            let mut response = next.run(request).await;
            let cookies = PENDING_COOKIES.with(|cell| cell.take());
            let headers = response.headers_mut();
            for cookie in cookies {
                headers.append(header::SET_COOKIE, cookie);
            }
            response
        })
        .await
}

/// Request extension set when the session cookies could not be checked
/// because the token store failed.
#[derive(Debug, Clone, Copy)]
pub struct SessionUnverified;

/// State for [`renew_session`].
#[derive(Clone)]
pub struct RenewalState {
    pub backend: AuthBackend,
    /// Full path of the login endpoint, which is never renewed.
    pub login_path: String,
}

/// Middleware that validates the cookie pair and injects a bearer header.
///
/// Never rejects a request itself: without a usable token the request goes
/// on unchanged and the `Auth` extractor decides.
pub async fn renew_session(
    State(state): State<RenewalState>,
    mut request: Request,
    next: Next,
) -> Response {
    if request.headers().contains_key(header::AUTHORIZATION)
        || request.uri().path() == state.login_path
    {
        return next.run(request).await;
    }

    let backend = &state.backend;
    let access = backend
        .cookies
        .read_access(request.headers())
        .map(str::to_owned);
    let refresh = backend
        .cookies
        .read_refresh(request.headers())
        .map(str::to_owned);

    let outcome = match (access.as_deref(), refresh.as_deref()) {
        (Some(access), refresh) => backend.verifier.check_access(access, refresh).await,
        (None, Some(refresh)) => backend.verifier.create_new_access_token(refresh).await,
        (None, None) => return next.run(request).await,
    };

    match outcome {
        RenewalOutcome::Valid(token) => {
            authorize(&mut request, backend, &token, refresh.as_deref());
        }
        RenewalOutcome::RenewedFromRefresh(token) => {
            debug!("Renewed session from refresh token");
            authorize(&mut request, backend, &token, refresh.as_deref());
        }
        RenewalOutcome::Unauthenticated => {
            debug!("No usable session cookies");
        }
        RenewalOutcome::StoreError(e) => {
            error!(error = %e, "Session renewal failed");
            request.extensions_mut().insert(SessionUnverified);
        }
    }

    next.run(request).await
}

/// Inject the bearer header and queue both cookies with fresh Max-Age values.
fn authorize(request: &mut Request, backend: &AuthBackend, token: &str, refresh: Option<&str>) {
    match HeaderValue::from_str(&format!("Bearer {token}")) {
        Ok(value) => {
            request.headers_mut().insert(header::AUTHORIZATION, value);
        }
        Err(e) => {
            error!(error = %e, "Access token is not a valid header value");
            return;
        }
    }
    queue_cookie(&backend.cookies.access_cookie(token));
    if let Some(refresh) = refresh {
        queue_cookie(&backend.cookies.refresh_cookie(refresh));
    }
}
