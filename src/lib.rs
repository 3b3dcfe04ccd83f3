pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod db;
pub mod principal;
pub mod rate_limit;
pub mod tokens;

use api::{API_PREFIX, LOGIN_PATH, create_api_router};
use auth::{AuthBackend, RenewalState, attach_queued_cookies, renew_session};
use axum::{Router, middleware};
use db::Database;
use rate_limit::RateLimitConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokens::TokenConfig;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Token lifetimes and issuance policy
    pub token_config: TokenConfig,
    /// Deployment name the cookie names are derived from
    pub cookie_prefix: String,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
    /// Key rate limits by X-Forwarded-For (requires running behind a proxy)
    pub trust_forwarded_for: bool,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let backend = AuthBackend::new(
        config.db.clone(),
        config.token_config.clone(),
        &config.cookie_prefix,
        config.secure_cookies,
    );
    create_app_with_backend(backend, config.trust_forwarded_for)
}

/// Create the application router around an existing authentication backend.
///
/// Layer order matters: `attach_queued_cookies` wraps `renew_session` so the
/// queue is open while renewal runs and drained after the handler returns.
pub fn create_app_with_backend(backend: AuthBackend, trust_forwarded_for: bool) -> Router {
    let rate_limit_config = Arc::new(RateLimitConfig::new(trust_forwarded_for));
    let renewal = RenewalState {
        backend: backend.clone(),
        login_path: LOGIN_PATH.to_string(),
    };

    Router::new()
        .nest(API_PREFIX, create_api_router(backend, rate_limit_config))
        .layer(middleware::from_fn_with_state(renewal, renew_session))
        .layer(middleware::from_fn(attach_queued_cookies))
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(db: &Database) {
    cleanup::run_cleanup(db).await;
    cleanup::spawn_cleanup_scheduler(db.clone());
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> std::io::Result<(tokio::task::JoinHandle<()>, SocketAddr)> {
    init_cleanup(&config.db).await;

    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
