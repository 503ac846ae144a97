use crate::domain::auth::RefreshRecord;
use crate::error::Result;
use crate::storage::DbPool;
use async_trait::async_trait;
use uuid::Uuid;

/// Persistence seam for refresh token records.
///
/// Records are append-then-revoke: nothing here ever deletes a row, so the
/// full token history stays available for audit.
#[async_trait]
pub trait TokenStore: Send + Sync + std::fmt::Debug {
    /// Inserts a new refresh record. The caller has already hashed the token.
    async fn insert(&self, record: &RefreshRecord) -> Result<()>;

    /// Atomically revokes the *active* record matching `token_hash` and
    /// returns it. Revoked, expired, and unknown hashes all return `None`,
    /// which is what makes rotation single-use under concurrent refreshes.
    async fn claim(&self, token_hash: &str) -> Result<Option<RefreshRecord>>;

    /// Marks the record matching `token_hash` as revoked if it is not
    /// already. Idempotent.
    async fn revoke(&self, token_hash: &str) -> Result<()>;

    /// Revokes every active record owned by `user_id`; returns the number
    /// of records touched.
    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64>;

    /// Connectivity probe for readiness checks.
    async fn ping(&self) -> Result<()>;
}

#[derive(Clone, Debug)]
pub struct PgTokenStore {
    pool: DbPool,
}

impl PgTokenStore {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn insert(&self, record: &RefreshRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens
                (id, user_id, token_hash, device_info, ip_address, expires_at, revoked_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.token_hash)
        .bind(&record.device_info)
        .bind(&record.ip_address)
        .bind(record.expires_at)
        .bind(record.revoked_at)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn claim(&self, token_hash: &str) -> Result<Option<RefreshRecord>> {
        // Single-row atomic update; two concurrent claims of the same hash
        // cannot both see revoked_at IS NULL.
        let record = sqlx::query_as::<_, RefreshRecord>(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = now()
            WHERE token_hash = $1 AND revoked_at IS NULL AND expires_at > now()
            RETURNING id, user_id, token_hash, device_info, ip_address, expires_at, revoked_at, created_at
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn revoke(&self, token_hash: &str) -> Result<()> {
        sqlx::query("UPDATE refresh_tokens SET revoked_at = now() WHERE token_hash = $1 AND revoked_at IS NULL")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = now()
            WHERE user_id = $1 AND revoked_at IS NULL AND expires_at > now()
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
