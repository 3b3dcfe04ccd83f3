//! Issued token storage for access and refresh tokens.
//!
//! Only a SHA-256 hash of each token's secret is stored. Expiry is enforced by
//! readers, so expired rows may linger until the cleanup task removes them.

use sqlx::sqlite::SqlitePool;

/// Which half of the token pair a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "access" => Some(TokenKind::Access),
            "refresh" => Some(TokenKind::Refresh),
            _ => None,
        }
    }
}

/// A persisted token record. All timestamps are Unix seconds.
#[derive(Debug, Clone)]
pub struct TokenRecord {
    pub id: i64,
    pub owner_id: i64,
    pub kind: TokenKind,
    pub secret_hash: String,
    pub created_at: i64,
    pub last_used_at: Option<i64>,
    pub expires_at: i64,
}

impl TokenRecord {
    /// A record is expired once `now` reaches its expiry.
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

#[derive(sqlx::FromRow)]
struct TokenRow {
    id: i64,
    owner_id: i64,
    kind: String,
    secret_hash: String,
    created_at: i64,
    last_used_at: Option<i64>,
    expires_at: i64,
}

impl TryFrom<TokenRow> for TokenRecord {
    type Error = sqlx::Error;

    fn try_from(row: TokenRow) -> Result<Self, Self::Error> {
        let kind = TokenKind::parse(&row.kind).ok_or_else(|| sqlx::Error::ColumnDecode {
            index: "kind".into(),
            source: format!("unknown token kind: {}", row.kind).into(),
        })?;
        Ok(Self {
            id: row.id,
            owner_id: row.owner_id,
            kind,
            secret_hash: row.secret_hash,
            created_at: row.created_at,
            last_used_at: row.last_used_at,
            expires_at: row.expires_at,
        })
    }
}

const TOKEN_COLUMNS: &str = "id, owner_id, kind, secret_hash, created_at, last_used_at, expires_at";

/// Store for managing issued tokens.
#[derive(Clone)]
pub struct TokenStore {
    pool: SqlitePool,
}

impl TokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a token record. Returns the new record ID.
    pub async fn create(
        &self,
        owner_id: i64,
        kind: TokenKind,
        secret_hash: &str,
        created_at: i64,
        expires_at: i64,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO auth_tokens (owner_id, kind, secret_hash, created_at, expires_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(owner_id)
        .bind(kind.as_str())
        .bind(secret_hash)
        .bind(created_at)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Get a token record by ID, restricted to the given kind.
    pub async fn get(&self, id: i64, kind: TokenKind) -> Result<Option<TokenRecord>, sqlx::Error> {
        let row: Option<TokenRow> = sqlx::query_as(&format!(
            "SELECT {TOKEN_COLUMNS} FROM auth_tokens WHERE id = ? AND kind = ?"
        ))
        .bind(id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TokenRecord::try_from).transpose()
    }

    /// Get a token record by ID regardless of kind.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<TokenRecord>, sqlx::Error> {
        let row: Option<TokenRow> = sqlx::query_as(&format!(
            "SELECT {TOKEN_COLUMNS} FROM auth_tokens WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TokenRecord::try_from).transpose()
    }

    /// Mark a token as used and push its expiry forward.
    /// Returns false if the record no longer exists.
    pub async fn touch(&self, id: i64, now: i64, expires_at: i64) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE auth_tokens SET last_used_at = ?, expires_at = ? WHERE id = ?")
                .bind(now)
                .bind(expires_at)
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a token by ID (revoke).
    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM auth_tokens WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete all tokens for an owner (logout everywhere).
    pub async fn delete_all_by_owner(&self, owner_id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM auth_tokens WHERE owner_id = ?")
            .bind(owner_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete all tokens that expired before `now`.
    pub async fn delete_expired(&self, now: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM auth_tokens WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// List an owner's tokens that are still live at `now`, newest first.
    pub async fn list_by_owner(
        &self,
        owner_id: i64,
        now: i64,
    ) -> Result<Vec<TokenRecord>, sqlx::Error> {
        let rows: Vec<TokenRow> = sqlx::query_as(&format!(
            "SELECT {TOKEN_COLUMNS} FROM auth_tokens WHERE owner_id = ? AND expires_at > ? ORDER BY id DESC"
        ))
        .bind(owner_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TokenRecord::try_from).collect()
    }
}
