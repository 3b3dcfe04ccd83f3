//! Token lookup, sliding expiry and refresh-based renewal.
//!
//! Every successful check slides the access token forward by the full access
//! lifetime and the refresh token by the full refresh lifetime. An active
//! session therefore never expires while it keeps making requests; the
//! refresh token bounds how long it may stay idle.

use std::sync::Arc;

use tracing::{debug, warn};

use super::plaintext::{PlaintextToken, secret_matches};
use super::{TokenConfig, TokenError, TokenIssuer, now_secs};
use crate::db::{TokenKind, TokenRecord, TokenStore};
use crate::principal::PrincipalStore;

/// Result of trying to obtain a usable access token for a request.
#[derive(Debug)]
pub enum RenewalOutcome {
    /// The presented access token is live; its expiry was slid forward.
    Valid(String),
    /// The refresh token revived the old access token or minted a new one.
    RenewedFromRefresh(String),
    /// No usable token pair.
    Unauthenticated,
    /// The token store failed. Treated like `Unauthenticated` by callers.
    StoreError(TokenError),
}

impl RenewalOutcome {
    /// The access token plaintext to authenticate with, if any.
    pub fn access_token(&self) -> Option<&str> {
        match self {
            Self::Valid(token) | Self::RenewedFromRefresh(token) => Some(token),
            Self::Unauthenticated | Self::StoreError(_) => None,
        }
    }

    pub fn into_access_token(self) -> Option<String> {
        match self {
            Self::Valid(token) | Self::RenewedFromRefresh(token) => Some(token),
            Self::Unauthenticated | Self::StoreError(_) => None,
        }
    }
}

fn settle(result: Result<RenewalOutcome, TokenError>) -> RenewalOutcome {
    result.unwrap_or_else(RenewalOutcome::StoreError)
}

#[derive(Clone)]
pub struct TokenVerifier {
    store: TokenStore,
    issuer: TokenIssuer,
    principals: Arc<dyn PrincipalStore>,
    config: Arc<TokenConfig>,
}

impl TokenVerifier {
    pub fn new(
        store: TokenStore,
        issuer: TokenIssuer,
        principals: Arc<dyn PrincipalStore>,
        config: Arc<TokenConfig>,
    ) -> Self {
        Self {
            store,
            issuer,
            principals,
            config,
        }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Find the record behind a plaintext token of the given kind.
    ///
    /// Malformed input is rejected without touching the store. A wrong secret
    /// and an unknown id both yield `None`. Expiry is not checked here.
    pub async fn lookup(
        &self,
        plaintext: &str,
        kind: TokenKind,
    ) -> Result<Option<TokenRecord>, TokenError> {
        let Some(token) = PlaintextToken::parse(plaintext) else {
            return Ok(None);
        };
        let Some(record) = self.store.get(token.id, kind).await? else {
            return Ok(None);
        };
        if secret_matches(token.secret, &record.secret_hash) {
            Ok(Some(record))
        } else {
            Ok(None)
        }
    }

    /// Like [`lookup`](Self::lookup), but expired records count as missing.
    async fn live_record(
        &self,
        plaintext: &str,
        kind: TokenKind,
        now: i64,
    ) -> Result<Option<TokenRecord>, TokenError> {
        Ok(self
            .lookup(plaintext, kind)
            .await?
            .filter(|record| !record.is_expired(now)))
    }

    /// Resolve a bearer access token without modifying it.
    pub async fn authenticate_bearer(
        &self,
        plaintext: &str,
    ) -> Result<Option<TokenRecord>, TokenError> {
        let now = now_secs()?;
        self.live_record(plaintext, TokenKind::Access, now).await
    }

    /// Validate the cookie pair and keep the session alive.
    ///
    /// The refresh token must be live for the session to count: a live access
    /// token without a refresh token, or with an expired one, is
    /// `Unauthenticated`. Bearer callers that only hold an access token go
    /// through [`TokenVerifier::authenticate_bearer`] instead.
    ///
    /// A live access token is returned unchanged with its expiry slid
    /// forward. An expired one is revived through the refresh token, and a
    /// missing or invalid one is replaced by a freshly minted token.
    pub async fn check_access(&self, access: &str, refresh: Option<&str>) -> RenewalOutcome {
        settle(self.try_check_access(access, refresh).await)
    }

    async fn try_check_access(
        &self,
        access: &str,
        refresh: Option<&str>,
    ) -> Result<RenewalOutcome, TokenError> {
        let now = now_secs()?;

        let Some(refresh) = refresh else {
            return Ok(RenewalOutcome::Unauthenticated);
        };
        let Some(refresh_record) = self.live_record(refresh, TokenKind::Refresh, now).await?
        else {
            return Ok(RenewalOutcome::Unauthenticated);
        };

        let Some(access_record) = self.lookup(access, TokenKind::Access).await? else {
            debug!(
                refresh_id = refresh_record.id,
                "Access token unknown, minting from refresh token"
            );
            return self.mint_from_refresh(&refresh_record, now).await;
        };

        if access_record.owner_id != refresh_record.owner_id {
            debug!(
                access_id = access_record.id,
                refresh_id = refresh_record.id,
                "Access and refresh tokens belong to different owners"
            );
            return Ok(RenewalOutcome::Unauthenticated);
        }

        if access_record.is_expired(now) {
            return self
                .revive(access, &access_record, &refresh_record, now)
                .await;
        }

        let threshold = self.config.refresh_threshold_secs();
        if threshold > 0 && access_record.expires_at - now <= threshold {
            let outcome = self.mint_from_refresh(&refresh_record, now).await?;
            if outcome.access_token().is_some() {
                // The old token expires on its own; the new one is usable.
                if let Err(e) = self.store.delete(access_record.id).await {
                    warn!(
                        access_id = access_record.id,
                        error = %e,
                        "Failed to delete rotated access token"
                    );
                }
            }
            return Ok(outcome);
        }

        let slid = self
            .store
            .touch(access_record.id, now, now + self.config.access_ttl_secs())
            .await?;
        if !slid {
            return self.mint_from_refresh(&refresh_record, now).await;
        }
        if !self.extend_refresh(&refresh_record, now).await? {
            return Ok(RenewalOutcome::Unauthenticated);
        }

        Ok(RenewalOutcome::Valid(access.to_string()))
    }

    /// Renew an access token using the refresh token.
    ///
    /// If the access record still exists it is revived and the original
    /// plaintext returned; if it was deleted meanwhile a new one is minted.
    pub async fn renew_from_refresh(&self, refresh: &str, access: &str) -> RenewalOutcome {
        settle(self.try_renew_from_refresh(refresh, access).await)
    }

    async fn try_renew_from_refresh(
        &self,
        refresh: &str,
        access: &str,
    ) -> Result<RenewalOutcome, TokenError> {
        let now = now_secs()?;
        let Some(refresh_record) = self.live_record(refresh, TokenKind::Refresh, now).await?
        else {
            return Ok(RenewalOutcome::Unauthenticated);
        };

        match self.lookup(access, TokenKind::Access).await? {
            Some(access_record) if access_record.owner_id == refresh_record.owner_id => {
                self.revive(access, &access_record, &refresh_record, now)
                    .await
            }
            Some(_) => Ok(RenewalOutcome::Unauthenticated),
            None => self.mint_from_refresh(&refresh_record, now).await,
        }
    }

    /// Mint a brand new access token from a refresh token alone.
    pub async fn create_new_access_token(&self, refresh: &str) -> RenewalOutcome {
        settle(self.try_create_new_access_token(refresh).await)
    }

    async fn try_create_new_access_token(
        &self,
        refresh: &str,
    ) -> Result<RenewalOutcome, TokenError> {
        let now = now_secs()?;
        match self.live_record(refresh, TokenKind::Refresh, now).await? {
            Some(refresh_record) => self.mint_from_refresh(&refresh_record, now).await,
            None => Ok(RenewalOutcome::Unauthenticated),
        }
    }

    async fn revive(
        &self,
        access: &str,
        access_record: &TokenRecord,
        refresh_record: &TokenRecord,
        now: i64,
    ) -> Result<RenewalOutcome, TokenError> {
        let revived = self
            .store
            .touch(access_record.id, now, now + self.config.access_ttl_secs())
            .await?;
        if !revived {
            debug!(
                access_id = access_record.id,
                "Access token vanished during renewal, minting a new one"
            );
            return self.mint_from_refresh(refresh_record, now).await;
        }
        if !self.extend_refresh(refresh_record, now).await? {
            return Ok(RenewalOutcome::Unauthenticated);
        }
        Ok(RenewalOutcome::RenewedFromRefresh(access.to_string()))
    }

    async fn mint_from_refresh(
        &self,
        refresh_record: &TokenRecord,
        now: i64,
    ) -> Result<RenewalOutcome, TokenError> {
        let owner = self
            .principals
            .find_by_id(refresh_record.owner_id)
            .await?
            .filter(|principal| principal.active);
        if owner.is_none() {
            return Ok(RenewalOutcome::Unauthenticated);
        }

        // Extend first: a refresh token revoked by a concurrent logout must
        // not produce a new access token.
        if !self.extend_refresh(refresh_record, now).await? {
            return Ok(RenewalOutcome::Unauthenticated);
        }

        let minted = self.issuer.mint_access(refresh_record.owner_id).await?;
        Ok(RenewalOutcome::RenewedFromRefresh(minted.plaintext))
    }

    async fn extend_refresh(
        &self,
        refresh_record: &TokenRecord,
        now: i64,
    ) -> Result<bool, TokenError> {
        Ok(self
            .store
            .touch(refresh_record.id, now, now + self.config.refresh_ttl_secs())
            .await?)
    }
}
