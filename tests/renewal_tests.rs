//! Tests for silent session renewal through the cookie pair.
//!
//! Tests cover:
//! - Sliding expiry of live access and refresh tokens
//! - Reviving an expired access token through the refresh token
//! - Minting a new access token when the old one is gone or malformed
//! - Expired refresh tokens ending the session
//! - Rotation inside the refresh threshold
//! - Cookies queued by handlers reaching the response

mod common;

use axum::{
    Router,
    extract::Request,
    http::{StatusCode, header},
    middleware,
    response::IntoResponse,
    routing::get,
};
use common::*;
use std::time::Duration;
use tokengate::auth::{
    Auth, AuthBackend, RenewalState, SessionUnverified, attach_queued_cookies, queue_cookie,
    renew_session,
};
use tokengate::db::UserRole;
use tokengate::tokens::TokenConfig;

async fn logged_in_app() -> (TestApp, String, String) {
    let app = create_test_app().await;
    create_user(&app.db, "alice@example.com", UserRole::User).await;
    let (access, refresh) = app.login("alice@example.com").await;
    (app, access, refresh)
}

#[tokio::test]
async fn test_live_access_token_slides_forward() {
    let (app, access, refresh) = logged_in_app().await;
    set_expiry(&app.db, token_id(&access), now() + 30).await;
    set_expiry(&app.db, token_id(&refresh), now() + 30).await;

    let response = app
        .send(request(
            "GET",
            "/api/v1/me",
            Some(&auth_cookies(&access, &refresh)),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let access_expiry = expires_at(&app.db, token_id(&access)).await.unwrap();
    assert!(access_expiry >= now() + 590);
    let refresh_expiry = expires_at(&app.db, token_id(&refresh)).await.unwrap();
    assert!(refresh_expiry >= now() + 86390);

    // Same tokens, re-issued with fresh Max-Age values.
    let cookies = extract_set_cookies(&response);
    assert_eq!(cookie_value(&cookies, ACCESS_COOKIE).unwrap(), access);
    assert_eq!(cookie_value(&cookies, REFRESH_COOKIE).unwrap(), refresh);
    assert!(
        cookie_line(&cookies, ACCESS_COOKIE)
            .unwrap()
            .contains("Max-Age=600")
    );
    assert!(
        cookie_line(&cookies, REFRESH_COOKIE)
            .unwrap()
            .contains("Max-Age=86400")
    );
}

#[tokio::test]
async fn test_expired_access_token_is_renewed() {
    let (app, access, refresh) = logged_in_app().await;
    set_expiry(&app.db, token_id(&access), now() - 60).await;

    let response = app
        .send(request(
            "GET",
            "/api/v1/me",
            Some(&auth_cookies(&access, &refresh)),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookies = extract_set_cookies(&response);
    let renewed = cookie_value(&cookies, ACCESS_COOKIE).unwrap();
    assert!(!renewed.is_empty());
    assert!(
        cookie_line(&cookies, ACCESS_COOKIE)
            .unwrap()
            .contains("Max-Age=600")
    );

    // The renewed token works as a bearer on its own.
    let record = app.db.tokens().get_by_id(token_id(&renewed)).await.unwrap();
    assert!(record.unwrap().expires_at > now());
}

#[tokio::test]
async fn test_deleted_access_token_is_replaced() {
    let (app, access, refresh) = logged_in_app().await;
    app.db.tokens().delete(token_id(&access)).await.unwrap();

    let response = app
        .send(request(
            "GET",
            "/api/v1/me",
            Some(&auth_cookies(&access, &refresh)),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookies = extract_set_cookies(&response);
    let renewed = cookie_value(&cookies, ACCESS_COOKIE).unwrap();
    assert_ne!(renewed, access);
    assert!(expires_at(&app.db, token_id(&renewed)).await.is_some());
}

#[tokio::test]
async fn test_refresh_cookie_alone_mints_access_token() {
    let (app, _access, refresh) = logged_in_app().await;

    let response = app
        .send(request(
            "GET",
            "/api/v1/me",
            Some(&format!("{REFRESH_COOKIE}={refresh}")),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookies = extract_set_cookies(&response);
    assert!(cookie_value(&cookies, ACCESS_COOKIE).is_some());
    assert_eq!(cookie_value(&cookies, REFRESH_COOKIE).unwrap(), refresh);
}

#[tokio::test]
async fn test_malformed_access_cookie_falls_back_to_refresh() {
    let (app, _access, refresh) = logged_in_app().await;

    for garbage in ["not-a-token", "abc|def", "12|", "%7Cxyz"] {
        let response = app
            .send(request(
                "GET",
                "/api/v1/me",
                Some(&auth_cookies(garbage, &refresh)),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK, "{garbage}");
    }
}

#[tokio::test]
async fn test_percent_encoded_cookie_is_accepted() {
    let (app, access, refresh) = logged_in_app().await;
    let encoded_access = access.replacen('|', "%7C", 1);
    let encoded_refresh = refresh.replacen('|', "%7C", 1);

    let response = app
        .send(request(
            "GET",
            "/api/v1/me",
            Some(&auth_cookies(&encoded_access, &encoded_refresh)),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_expired_refresh_ends_session() {
    let (app, access, refresh) = logged_in_app().await;
    set_expiry(&app.db, token_id(&refresh), now() - 1).await;

    // A still-fresh access token is not enough without a live refresh token.
    let response = app
        .send(request(
            "GET",
            "/api/v1/me",
            Some(&auth_cookies(&access, &refresh)),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(extract_set_cookies(&response).is_empty());

    let response = app
        .send(request(
            "GET",
            "/api/v1/me",
            Some(&format!("{ACCESS_COOKIE}={access}")),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_garbage_cookies_are_unauthenticated() {
    let app = create_test_app().await;

    let response = app
        .send(request(
            "GET",
            "/api/v1/me",
            Some(&auth_cookies("1|nope", "2|nope")),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .send(request(
            "GET",
            "/api/v1/me",
            Some(&format!("{ACCESS_COOKIE}=no-separator")),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(extract_set_cookies(&response).is_empty());
}

#[tokio::test]
async fn test_repeated_renewal_of_same_expired_token() {
    let (app, access, refresh) = logged_in_app().await;
    set_expiry(&app.db, token_id(&access), now() - 60).await;
    let cookies = auth_cookies(&access, &refresh);

    for _ in 0..2 {
        let response = app
            .send(request("GET", "/api/v1/me", Some(&cookies)))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_rotation_inside_threshold() {
    let app = create_test_app_with(TokenConfig {
        refresh_threshold: Duration::from_secs(120),
        ..TokenConfig::default()
    })
    .await;
    create_user(&app.db, "alice@example.com", UserRole::User).await;
    let (access, refresh) = app.login("alice@example.com").await;
    set_expiry(&app.db, token_id(&access), now() + 60).await;

    let response = app
        .send(request(
            "GET",
            "/api/v1/me",
            Some(&auth_cookies(&access, &refresh)),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookies = extract_set_cookies(&response);
    let rotated = cookie_value(&cookies, ACCESS_COOKIE).unwrap();
    assert_ne!(rotated, access);
    assert!(expires_at(&app.db, token_id(&access)).await.is_none());
}

fn with_renewal(router: Router<AuthBackend>, backend: AuthBackend) -> Router {
    router
        .with_state(backend.clone())
        .layer(middleware::from_fn_with_state(
            RenewalState {
                backend,
                login_path: "/login".to_string(),
            },
            renew_session,
        ))
        .layer(middleware::from_fn(attach_queued_cookies))
}

async fn export_report(Auth(auth): Auth) -> impl IntoResponse {
    queue_cookie("report_ready=1; Path=/");
    format!("report for {}", auth.principal.email)
}

#[tokio::test]
async fn test_handler_queued_cookies_join_renewed_ones() {
    let (app, access, refresh) = logged_in_app().await;
    let backend = AuthBackend::new(app.db.clone(), TokenConfig::default(), "tokengate", false);

    let reports = TestApp {
        app: with_renewal(Router::new().route("/report", get(export_report)), backend),
        db: app.db.clone(),
    };
    set_expiry(&app.db, token_id(&access), now() - 60).await;

    let response = reports
        .send(request(
            "GET",
            "/report",
            Some(&auth_cookies(&access, &refresh)),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookies = extract_set_cookies(&response);
    assert_eq!(cookies.len(), 3);
    assert!(cookie_value(&cookies, ACCESS_COOKIE).is_some());
    assert!(cookie_value(&cookies, REFRESH_COOKIE).is_some());
    assert_eq!(cookie_value(&cookies, "report_ready").unwrap(), "1");
}

async fn describe_caller(request: Request) -> String {
    let authorized = request.headers().contains_key(header::AUTHORIZATION);
    let unverified = request.extensions().get::<SessionUnverified>().is_some();
    format!("authorized={authorized} unverified={unverified}")
}

#[tokio::test]
async fn test_store_failure_does_not_fail_request() {
    let (app, access, refresh) = logged_in_app().await;
    let backend = AuthBackend::new(app.db.clone(), TokenConfig::default(), "tokengate", false);
    let public = TestApp {
        app: with_renewal(Router::new().route("/public", get(describe_caller)), backend),
        db: app.db.clone(),
    };
    app.db.pool().close().await;

    let response = public
        .send(request(
            "GET",
            "/public",
            Some(&auth_cookies(&access, &refresh)),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(extract_set_cookies(&response).is_empty());

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"authorized=false unverified=true");
}
