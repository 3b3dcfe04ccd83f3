//! Minting of access and refresh tokens.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::plaintext::{format_token, generate_secret, hash_secret};
use super::{TokenConfig, TokenError, now_secs};
use crate::db::{TokenKind, TokenStore};

/// A freshly minted token. The plaintext cannot be recovered later.
#[derive(Debug, Clone)]
pub struct MintedToken {
    pub id: i64,
    pub plaintext: String,
    pub expires_at: i64,
}

/// Result of a login: one access and one refresh token.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: MintedToken,
    pub refresh: MintedToken,
}

#[derive(Clone)]
pub struct TokenIssuer {
    store: TokenStore,
    config: Arc<TokenConfig>,
}

impl TokenIssuer {
    pub fn new(store: TokenStore, config: Arc<TokenConfig>) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Persist a new token of the given kind and return its plaintext once.
    pub async fn mint(
        &self,
        owner_id: i64,
        kind: TokenKind,
        ttl: Duration,
    ) -> Result<MintedToken, TokenError> {
        let now = now_secs()?;
        let expires_at = now + ttl.as_secs() as i64;
        let secret = generate_secret();

        let id = self
            .store
            .create(owner_id, kind, &hash_secret(&secret), now, expires_at)
            .await?;

        debug!(token_id = id, owner_id, kind = kind.as_str(), "Minted token");

        Ok(MintedToken {
            id,
            plaintext: format_token(id, &secret),
            expires_at,
        })
    }

    /// Mint a fresh access token with the configured lifetime.
    pub async fn mint_access(&self, owner_id: i64) -> Result<MintedToken, TokenError> {
        self.mint(owner_id, TokenKind::Access, self.config.access_ttl)
            .await
    }

    /// Revoke every token the owner holds, then mint a new access/refresh pair.
    ///
    /// Owners listed in `protected_owner_ids` keep their existing tokens.
    pub async fn mint_pair(&self, owner_id: i64) -> Result<TokenPair, TokenError> {
        if self.config.is_protected(owner_id) {
            debug!(owner_id, "Keeping existing tokens for protected owner");
        } else {
            let revoked = self.store.delete_all_by_owner(owner_id).await?;
            if revoked > 0 {
                info!(owner_id, revoked, "Revoked previous tokens");
            }
        }

        let access = self.mint_access(owner_id).await?;
        let refresh = self
            .mint(owner_id, TokenKind::Refresh, self.config.refresh_ttl)
            .await?;

        Ok(TokenPair { access, refresh })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, NewUser, UserRole};
    use crate::tokens::PlaintextToken;

    async fn setup(config: TokenConfig) -> (Database, TokenIssuer, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let owner = db
            .users()
            .create(&NewUser {
                uuid: "uuid-1",
                email: "owner@example.com",
                name: "Owner",
                password_hash: "x",
                role: UserRole::User,
            })
            .await
            .unwrap();
        let issuer = TokenIssuer::new(db.tokens(), Arc::new(config));
        (db, issuer, owner)
    }

    #[tokio::test]
    async fn test_mint_stores_only_hash() {
        let (db, issuer, owner) = setup(TokenConfig::default()).await;

        let minted = issuer
            .mint(owner, TokenKind::Access, Duration::from_secs(60))
            .await
            .unwrap();
        let parsed = PlaintextToken::parse(&minted.plaintext).unwrap();
        assert_eq!(parsed.id, minted.id);

        let record = db
            .tokens()
            .get(minted.id, TokenKind::Access)
            .await
            .unwrap()
            .unwrap();
        assert_ne!(record.secret_hash, parsed.secret);
        assert_eq!(record.secret_hash, hash_secret(parsed.secret));
        assert_eq!(record.expires_at - record.created_at, 60);
        assert_eq!(record.owner_id, owner);
    }

    #[tokio::test]
    async fn test_mint_pair_distinct_ids_and_ttls() {
        let (db, issuer, owner) = setup(TokenConfig::default()).await;

        let pair = issuer.mint_pair(owner).await.unwrap();
        assert_ne!(pair.access.id, pair.refresh.id);

        let access = db
            .tokens()
            .get(pair.access.id, TokenKind::Access)
            .await
            .unwrap()
            .unwrap();
        let refresh = db
            .tokens()
            .get(pair.refresh.id, TokenKind::Refresh)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(access.expires_at - access.created_at, 600);
        assert_eq!(refresh.expires_at - refresh.created_at, 86400);
    }

    #[tokio::test]
    async fn test_mint_pair_revokes_previous_tokens() {
        let (db, issuer, owner) = setup(TokenConfig::default()).await;

        let first = issuer.mint_pair(owner).await.unwrap();
        let second = issuer.mint_pair(owner).await.unwrap();

        let tokens = db.tokens();
        assert!(tokens.get(first.access.id, TokenKind::Access).await.unwrap().is_none());
        assert!(tokens.get(first.refresh.id, TokenKind::Refresh).await.unwrap().is_none());
        assert_eq!(tokens.list_by_owner(owner, 0).await.unwrap().len(), 2);
        assert!(tokens.get(second.access.id, TokenKind::Access).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_mint_pair_keeps_tokens_of_protected_owner() {
        let (db, issuer, owner) = setup(TokenConfig::default()).await;
        let issuer = TokenIssuer::new(
            db.tokens(),
            Arc::new(TokenConfig {
                protected_owner_ids: vec![owner],
                ..issuer.config().clone()
            }),
        );

        issuer.mint_pair(owner).await.unwrap();
        issuer.mint_pair(owner).await.unwrap();

        assert_eq!(db.tokens().list_by_owner(owner, 0).await.unwrap().len(), 4);
    }
}
