//! Cookie-based authentication with silent renewal.
//!
//! Dual-token system: short-lived access tokens that slide forward on use
//! and long-lived refresh tokens that revive or replace them. Both travel
//! as HTTP-only cookies; handlers only ever see a bearer header.

mod cookie;
mod errors;
mod extractors;
mod ip;
mod renewal;
mod state;
mod types;

pub use cookie::{
    ACCESS_COOKIE_SUFFIX, CookieCodec, REFRESH_COOKIE_SUFFIX, cookie_prefix, get_cookie,
};
pub use errors::{ApiAuthError, AuthErrorKind};
pub use extractors::{Auth, OptionalAuth, bearer_token};
pub use ip::{HasHeadersAndExtensions, extract_client_ip};
pub use renewal::{
    RenewalState, SessionUnverified, attach_queued_cookies, discard_queued_cookies, queue_cookie,
    renew_session,
};
pub use state::{AuthBackend, HasAuthBackend};
pub use types::AuthenticatedUser;
