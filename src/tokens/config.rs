//! Lifetimes and issuance policy for the token pair.

use std::time::Duration;

/// Default access token lifetime: 10 minutes.
pub const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(10 * 60);

/// Default refresh token lifetime: 1 day.
pub const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Token policy injected into the issuer, verifier and renewal middleware.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Lifetime of an access token, re-applied on every successful use.
    pub access_ttl: Duration,
    /// Lifetime of a refresh token, re-applied on every renewal.
    pub refresh_ttl: Duration,
    /// When non-zero, a live access token this close to expiry is replaced
    /// by a freshly minted one instead of being slid forward.
    pub refresh_threshold: Duration,
    /// Owners whose existing tokens survive a new login.
    pub protected_owner_ids: Vec<i64>,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_ttl: DEFAULT_ACCESS_TTL,
            refresh_ttl: DEFAULT_REFRESH_TTL,
            refresh_threshold: Duration::ZERO,
            protected_owner_ids: Vec::new(),
        }
    }
}

impl TokenConfig {
    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl.as_secs() as i64
    }

    pub fn refresh_ttl_secs(&self) -> i64 {
        self.refresh_ttl.as_secs() as i64
    }

    pub fn refresh_threshold_secs(&self) -> i64 {
        self.refresh_threshold.as_secs() as i64
    }

    pub fn is_protected(&self, owner_id: i64) -> bool {
        self.protected_owner_ids.contains(&owner_id)
    }
}
