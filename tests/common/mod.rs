#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{Request, Response, header},
};
use std::net::SocketAddr;
use tokengate::{
    ServerConfig, create_app,
    db::{Database, NewUser, UserRole},
    principal::hash_password,
    tokens::{PlaintextToken, TokenConfig, now_secs},
};

pub const TEST_PASSWORD: &str = "correct horse battery staple";
pub const ACCESS_COOKIE: &str = "tokengate_access_token";
pub const REFRESH_COOKIE: &str = "tokengate_refresh_token";
pub const TEST_PEER: &str = "127.0.0.1:50000";

pub struct TestApp {
    pub app: Router,
    pub db: Database,
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        use tower::ServiceExt;
        self.app.clone().oneshot(request).await.unwrap()
    }

    /// Log in and return the (access, refresh) cookie values.
    pub async fn login(&self, email: &str) -> (String, String) {
        let response = self.send(login_request(email, TEST_PASSWORD)).await;
        assert_eq!(response.status(), 200, "login failed for {email}");
        let cookies = extract_set_cookies(&response);
        (
            cookie_value(&cookies, ACCESS_COOKIE).unwrap(),
            cookie_value(&cookies, REFRESH_COOKIE).unwrap(),
        )
    }
}

pub async fn create_test_app() -> TestApp {
    create_test_app_with(TokenConfig::default()).await
}

pub async fn create_test_app_with(token_config: TokenConfig) -> TestApp {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let config = ServerConfig {
        db: db.clone(),
        token_config,
        cookie_prefix: "tokengate".to_string(),
        secure_cookies: false,
        trust_forwarded_for: false,
    };
    TestApp {
        app: create_app(&config),
        db,
    }
}

/// Create a user with [`TEST_PASSWORD`] and return its ID.
pub async fn create_user(db: &Database, email: &str, role: UserRole) -> i64 {
    let hash = hash_password(TEST_PASSWORD).unwrap();
    let uuid = uuid::Uuid::new_v4().to_string();
    db.users()
        .create(&NewUser {
            uuid: &uuid,
            email,
            name: email.split('@').next().unwrap(),
            password_hash: &hash,
            role,
        })
        .await
        .unwrap()
}

fn with_peer(mut request: Request<Body>) -> Request<Body> {
    let peer: SocketAddr = TEST_PEER.parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(peer));
    request
}

pub fn login_request(email: &str, password: &str) -> Request<Body> {
    let body = serde_json::json!({ "email": email, "password": password });
    with_peer(
        Request::builder()
            .method("POST")
            .uri("/api/v1/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
}

pub fn request(method: &str, uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    with_peer(builder.body(Body::empty()).unwrap())
}

pub fn auth_cookies(access: &str, refresh: &str) -> String {
    format!("{ACCESS_COOKIE}={access}; {REFRESH_COOKIE}={refresh}")
}

/// Extract Set-Cookie headers from response
pub fn extract_set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

/// The value of the last Set-Cookie for `name`.
pub fn cookie_value(cookies: &[String], name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    cookies
        .iter()
        .rev()
        .find_map(|c| c.strip_prefix(&prefix))
        .map(|rest| rest.split(';').next().unwrap_or("").to_string())
}

/// The full Set-Cookie line for `name`.
pub fn cookie_line<'a>(cookies: &'a [String], name: &str) -> Option<&'a str> {
    let prefix = format!("{name}=");
    cookies
        .iter()
        .rev()
        .find(|c| c.starts_with(&prefix))
        .map(String::as_str)
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn token_id(plaintext: &str) -> i64 {
    PlaintextToken::parse(plaintext).unwrap().id
}

pub fn now() -> i64 {
    now_secs().unwrap()
}

pub async fn set_expiry(db: &Database, token_id: i64, expires_at: i64) {
    sqlx::query("UPDATE auth_tokens SET expires_at = ? WHERE id = ?")
        .bind(expires_at)
        .bind(token_id)
        .execute(db.pool())
        .await
        .unwrap();
}

pub async fn expires_at(db: &Database, token_id: i64) -> Option<i64> {
    db.tokens()
        .get_by_id(token_id)
        .await
        .unwrap()
        .map(|record| record.expires_at)
}

/// Make every DELETE on `auth_tokens` fail.
pub async fn block_token_deletes(db: &Database) {
    sqlx::query(
        "CREATE TRIGGER keep_tokens BEFORE DELETE ON auth_tokens \
         BEGIN SELECT RAISE(ABORT, 'deletes disabled'); END",
    )
    .execute(db.pool())
    .await
    .unwrap();
}
