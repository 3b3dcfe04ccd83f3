//! Cookie names, `Set-Cookie` building and `Cookie` header parsing.

use axum::http::{HeaderMap, header};

use crate::tokens::TokenConfig;

/// Suffix of the access token cookie name.
pub const ACCESS_COOKIE_SUFFIX: &str = "access_token";

/// Suffix of the refresh token cookie name.
pub const REFRESH_COOKIE_SUFFIX: &str = "refresh_token";

/// Expiry sent when clearing a cookie, for clients that ignore `Max-Age`.
const EXPIRED_DATE: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                return Some(value.trim());
            }
        }
    }
    None
}

/// Turn a deployment name into a cookie name prefix.
///
/// Lowercases, collapses runs of non-alphanumeric characters into a single
/// `_` and trims underscores from both ends: `"My App!"` becomes `"my_app"`.
pub fn cookie_prefix(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}

fn cookie_name(prefix: &str, suffix: &str) -> String {
    if prefix.is_empty() {
        suffix.to_string()
    } else {
        format!("{prefix}_{suffix}")
    }
}

/// Builds and reads the access/refresh cookie pair.
#[derive(Debug, Clone)]
pub struct CookieCodec {
    access_name: String,
    refresh_name: String,
    secure: bool,
    access_max_age: u64,
    refresh_max_age: u64,
}

impl CookieCodec {
    /// `prefix` is slugged with [`cookie_prefix`]. Max-Age values follow the
    /// token lifetimes so cookies and records expire together.
    pub fn new(prefix: &str, secure: bool, config: &TokenConfig) -> Self {
        let prefix = cookie_prefix(prefix);
        Self {
            access_name: cookie_name(&prefix, ACCESS_COOKIE_SUFFIX),
            refresh_name: cookie_name(&prefix, REFRESH_COOKIE_SUFFIX),
            secure,
            access_max_age: config.access_ttl.as_secs(),
            refresh_max_age: config.refresh_ttl.as_secs(),
        }
    }

    pub fn access_cookie_name(&self) -> &str {
        &self.access_name
    }

    pub fn refresh_cookie_name(&self) -> &str {
        &self.refresh_name
    }

    pub fn access_cookie(&self, value: &str) -> String {
        self.build(&self.access_name, value, self.access_max_age)
    }

    pub fn refresh_cookie(&self, value: &str) -> String {
        self.build(&self.refresh_name, value, self.refresh_max_age)
    }

    pub fn clear_access_cookie(&self) -> String {
        self.clear(&self.access_name)
    }

    pub fn clear_refresh_cookie(&self) -> String {
        self.clear(&self.refresh_name)
    }

    /// The access cookie value. Empty values count as absent.
    pub fn read_access<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        get_cookie(headers, &self.access_name).filter(|v| !v.is_empty())
    }

    /// The refresh cookie value. Empty values count as absent.
    pub fn read_refresh<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        get_cookie(headers, &self.refresh_name).filter(|v| !v.is_empty())
    }

    fn build(&self, name: &str, value: &str, max_age: u64) -> String {
        let secure = if self.secure { "; Secure" } else { "" };
        format!("{name}={value}; Path=/; Max-Age={max_age}; HttpOnly; SameSite=Lax{secure}")
    }

    fn clear(&self, name: &str) -> String {
        let secure = if self.secure { "; Secure" } else { "" };
        format!(
            "{name}=; Path=/; Max-Age=0; Expires={EXPIRED_DATE}; HttpOnly; SameSite=Lax{secure}"
        )
    }
}
