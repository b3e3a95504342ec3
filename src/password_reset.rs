/// Single-use, time-boxed password reset tokens.
///
/// At most one unused, unexpired token exists per user: issuing a new one
/// deletes all prior tokens for that user in the same atomic store
/// operation, so a concurrent consume of an old token deterministically
/// fails with `TokenInvalid`. Tokens are random 48-character alphanumeric
/// strings, stored only as SHA-256 hashes. Consume precedence is a defined
/// order: missing -> TokenInvalid, expired -> TokenExpired (checked before
/// the used flag), used -> TokenUsed.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, ResetError};

const TOKEN_LENGTH: usize = 48;
const TOKEN_VALIDITY_HOURS: i64 = 1;

#[derive(Debug, Clone)]
pub struct ResetTokenRecord {
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
}

impl ResetTokenRecord {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Storage seam for the reset-token table. The ledger owns this table
/// exclusively.
#[async_trait]
pub trait ResetTokenStore: Send + Sync {
    /// Deletes all prior tokens for the user and inserts the new one as a
    /// single atomic operation.
    async fn replace_for_user(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn find(&self, token_hash: &str) -> Result<Option<ResetTokenRecord>, AppError>;

    /// Flips the used flag if and only if it was unset; returns whether
    /// this call won the flip.
    async fn consume(&self, token_hash: &str) -> Result<bool, AppError>;

    /// Removes expired rows; returns how many were deleted.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}

/// Issues and consumes reset tokens over an injected store.
pub struct PasswordResetLedger {
    store: std::sync::Arc<dyn ResetTokenStore>,
}

impl PasswordResetLedger {
    pub fn new(store: std::sync::Arc<dyn ResetTokenStore>) -> Self {
        Self { store }
    }

    /// Mints a new single-use token for the user, invalidating any prior
    /// outstanding token. Returns the plaintext token for out-of-band
    /// delivery; only its hash is stored.
    pub async fn request_reset(&self, user_id: Uuid) -> Result<String, AppError> {
        let token = generate_reset_token();
        let expires_at = Utc::now() + Duration::hours(TOKEN_VALIDITY_HOURS);

        self.store
            .replace_for_user(user_id, &hash_token(&token), expires_at)
            .await?;

        tracing::info!(user_id = %user_id, "Password reset token issued");
        Ok(token)
    }

    /// Validates and irreversibly consumes a token, returning the owning
    /// user id. Expiry is reported before the used flag.
    pub async fn consume_reset(&self, token: &str) -> Result<Uuid, AppError> {
        let token_hash = hash_token(token);

        let record = self
            .store
            .find(&token_hash)
            .await?
            .ok_or(AppError::Reset(ResetError::TokenInvalid))?;

        if record.is_expired() {
            tracing::warn!(user_id = %record.user_id, "Expired password reset token used");
            return Err(AppError::Reset(ResetError::TokenExpired));
        }

        if record.used {
            tracing::warn!(user_id = %record.user_id, "Already used password reset token");
            return Err(AppError::Reset(ResetError::TokenUsed));
        }

        // Lost the flip race to a concurrent consume.
        if !self.store.consume(&token_hash).await? {
            return Err(AppError::Reset(ResetError::TokenInvalid));
        }

        Ok(record.user_id)
    }

    /// Garbage-collects expired rows. Run periodically.
    pub async fn sweep_expired(&self) -> Result<u64, AppError> {
        let removed = self.store.delete_expired(Utc::now()).await?;
        if removed > 0 {
            tracing::info!(removed = removed, "Expired password reset tokens removed");
        }
        Ok(removed)
    }
}

pub(crate) fn generate_reset_token() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

pub(crate) fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub struct PostgresResetTokenStore {
    pool: PgPool,
}

impl PostgresResetTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResetTokenStore for PostgresResetTokenStore {
    async fn replace_for_user(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM password_reset_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO password_reset_tokens (id, user_id, token_hash, expires_at, used, created_at)
            VALUES ($1, $2, $3, $4, false, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .bind(Utc::now())
        .execute(&mut tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find(&self, token_hash: &str) -> Result<Option<ResetTokenRecord>, AppError> {
        let row = sqlx::query_as::<_, (Uuid, String, DateTime<Utc>, bool)>(
            r#"
            SELECT user_id, token_hash, expires_at, used
            FROM password_reset_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(user_id, token_hash, expires_at, used)| ResetTokenRecord {
            user_id,
            token_hash,
            expires_at,
            used,
        }))
    }

    async fn consume(&self, token_hash: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE password_reset_tokens SET used = true WHERE token_hash = $1 AND used = false",
        )
        .bind(token_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM password_reset_tokens WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

/// In-memory store for tests and single-process setups.
#[derive(Default)]
pub struct InMemoryResetTokenStore {
    rows: Mutex<HashMap<String, ResetTokenRecord>>,
}

impl InMemoryResetTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResetTokenStore for InMemoryResetTokenStore {
    async fn replace_for_user(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| AppError::Internal("reset token store lock poisoned".to_string()))?;
        rows.retain(|_, record| record.user_id != user_id);
        rows.insert(
            token_hash.to_string(),
            ResetTokenRecord {
                user_id,
                token_hash: token_hash.to_string(),
                expires_at,
                used: false,
            },
        );
        Ok(())
    }

    async fn find(&self, token_hash: &str) -> Result<Option<ResetTokenRecord>, AppError> {
        let rows = self
            .rows
            .lock()
            .map_err(|_| AppError::Internal("reset token store lock poisoned".to_string()))?;
        Ok(rows.get(token_hash).cloned())
    }

    async fn consume(&self, token_hash: &str) -> Result<bool, AppError> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| AppError::Internal("reset token store lock poisoned".to_string()))?;
        match rows.get_mut(token_hash) {
            Some(record) if !record.used => {
                record.used = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| AppError::Internal("reset token store lock poisoned".to_string()))?;
        let before = rows.len();
        rows.retain(|_, record| record.expires_at >= now);
        Ok((before - rows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ledger_with_store() -> (PasswordResetLedger, Arc<InMemoryResetTokenStore>) {
        let store = Arc::new(InMemoryResetTokenStore::new());
        (PasswordResetLedger::new(store.clone()), store)
    }

    #[test]
    fn generated_tokens_are_long_and_unique() {
        let a = generate_reset_token();
        let b = generate_reset_token();
        assert_eq!(a.len(), TOKEN_LENGTH);
        assert!(a.chars().all(|c| c.is_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn hash_is_stable_and_not_plaintext() {
        let token = generate_reset_token();
        assert_eq!(hash_token(&token), hash_token(&token));
        assert_ne!(hash_token(&token), token);
    }

    #[tokio::test]
    async fn consume_roundtrip() {
        let (ledger, _) = ledger_with_store();
        let user_id = Uuid::new_v4();

        let token = ledger.request_reset(user_id).await.unwrap();
        let consumed_for = ledger.consume_reset(&token).await.unwrap();
        assert_eq!(consumed_for, user_id);
    }

    #[tokio::test]
    async fn unknown_token_is_invalid() {
        let (ledger, _) = ledger_with_store();
        let result = ledger.consume_reset("nope").await;
        assert!(matches!(result, Err(AppError::Reset(ResetError::TokenInvalid))));
    }

    #[tokio::test]
    async fn second_consume_reports_used() {
        let (ledger, _) = ledger_with_store();
        let token = ledger.request_reset(Uuid::new_v4()).await.unwrap();

        ledger.consume_reset(&token).await.unwrap();
        let result = ledger.consume_reset(&token).await;
        assert!(matches!(result, Err(AppError::Reset(ResetError::TokenUsed))));
    }

    #[tokio::test]
    async fn new_request_invalidates_prior_token() {
        let (ledger, _) = ledger_with_store();
        let user_id = Uuid::new_v4();

        let old_token = ledger.request_reset(user_id).await.unwrap();
        let _new_token = ledger.request_reset(user_id).await.unwrap();

        // Deleted, not used: TokenInvalid is the defined outcome.
        let result = ledger.consume_reset(&old_token).await;
        assert!(matches!(result, Err(AppError::Reset(ResetError::TokenInvalid))));
    }

    #[tokio::test]
    async fn expired_token_reports_expired_before_used() {
        let (ledger, store) = ledger_with_store();
        let user_id = Uuid::new_v4();
        let token = ledger.request_reset(user_id).await.unwrap();

        // Backdate the row past its expiry without flipping the used flag.
        store
            .replace_for_user(user_id, &hash_token(&token), Utc::now() - Duration::minutes(1))
            .await
            .unwrap();

        let result = ledger.consume_reset(&token).await;
        assert!(matches!(result, Err(AppError::Reset(ResetError::TokenExpired))));
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_rows() {
        let (ledger, store) = ledger_with_store();
        let expired_user = Uuid::new_v4();
        let live_user = Uuid::new_v4();

        store
            .replace_for_user(expired_user, "hash-a", Utc::now() - Duration::minutes(5))
            .await
            .unwrap();
        let live_token = ledger.request_reset(live_user).await.unwrap();

        assert_eq!(ledger.sweep_expired().await.unwrap(), 1);
        assert!(ledger.consume_reset(&live_token).await.is_ok());
    }
}
