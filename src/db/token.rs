//! Refresh token records.
//!
//! Only refresh tokens are stored; access tokens are stateless. Records move
//! from active to revoked exactly once and are never deleted, so a replayed
//! token can always be recognised as spent.

use sqlx::sqlite::SqlitePool;

use super::RepositoryError;

/// A stored refresh token.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub jti: String,
    /// Authoritative expiry (Unix seconds), independent of the JWT `exp`
    pub expires_at: i64,
    pub revoked: bool,
    /// Bumped on every write, used for conditional rotation
    pub version: i64,
    pub created_at: String,
}

impl RefreshTokenRecord {
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expires_at < now as i64
    }
}

/// Store for refresh token records.
pub struct RefreshTokenStore {
    pool: SqlitePool,
}

impl RefreshTokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new active record.
    pub async fn create(
        &self,
        user_id: i64,
        token: &str,
        jti: &str,
        expires_at: u64,
    ) -> Result<i64, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO refresh_tokens (user_id, token, jti, expires_at, revoked) VALUES (?, ?, ?, ?, 0)",
        )
        .bind(user_id)
        .bind(token)
        .bind(jti)
        .bind(expires_at as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Find the non-revoked record holding this exact token string.
    pub async fn find_active(
        &self,
        token: &str,
    ) -> Result<Option<RefreshTokenRecord>, RepositoryError> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            "SELECT id, user_id, token, jti, expires_at, revoked, version, created_at FROM refresh_tokens WHERE token = ? AND revoked = 0",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Get a record by its JWT ID, revoked or not.
    pub async fn get_by_jti(&self, jti: &str) -> Result<Option<RefreshTokenRecord>, RepositoryError> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            "SELECT id, user_id, token, jti, expires_at, revoked, version, created_at FROM refresh_tokens WHERE jti = ?",
        )
        .bind(jti)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Revoke a record only if it is still active at the version that was read.
    ///
    /// Returns false when another writer got there first, which makes exactly
    /// one of several concurrent rotations of the same token succeed.
    pub async fn revoke_if_current(
        &self,
        record: &RefreshTokenRecord,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked = 1, version = version + 1 WHERE id = ? AND revoked = 0 AND version = ?",
        )
        .bind(record.id)
        .bind(record.version)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Revoke every active record holding this token string.
    pub async fn revoke_by_token(&self, token: &str) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked = 1, version = version + 1 WHERE token = ? AND revoked = 0",
        )
        .bind(token)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Revoke all active records whose stored expiry is before `now`.
    pub async fn revoke_expired(&self, now: u64) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked = 1, version = version + 1 WHERE revoked = 0 AND expires_at < ?",
        )
        .bind(now as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// List active (non-revoked, unexpired) records for a user, newest first.
    pub async fn list_active_by_user(
        &self,
        user_id: i64,
        now: u64,
    ) -> Result<Vec<RefreshTokenRecord>, RepositoryError> {
        let records = sqlx::query_as::<_, RefreshTokenRecord>(
            "SELECT id, user_id, token, jti, expires_at, revoked, version, created_at FROM refresh_tokens WHERE user_id = ? AND revoked = 0 AND expires_at >= ? ORDER BY id DESC",
        )
        .bind(user_id)
        .bind(now as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    /// Count all records for a user, including revoked ones.
    pub async fn count_by_user(&self, user_id: i64) -> Result<i64, RepositoryError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM refresh_tokens WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }
}
