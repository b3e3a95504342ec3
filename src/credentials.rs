/// Credential records and their lookup service.
///
/// The identity record is owned by the persistence layer; this core reads
/// flags and roles, and mutates only the transitions driven by the
/// verification and reset flows (password update, verified/enabled flip).
/// The store is a trait seam so the service can be composed with Postgres
/// in production and an in-memory table in tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, RegistrationError};

#[derive(Debug, Clone)]
pub struct Credential {
    pub id: Uuid,
    /// Normalized (lowercase) email; uniqueness is case-insensitive.
    pub email: String,
    pub password_hash: String,
    pub enabled: bool,
    pub locked: bool,
    pub email_verified: bool,
    pub roles: Vec<String>,
}

impl Credential {
    /// A freshly registered account: disabled and unverified until the
    /// email verification flow flips the flags.
    pub fn new_registration(email: String, password_hash: String, role: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: normalize_email(&email),
            password_hash,
            enabled: false,
            locked: false,
            email_verified: false,
            roles: vec![role],
        }
    }

    /// Whether the account may authenticate at all.
    pub fn can_login(&self) -> bool {
        self.enabled && !self.locked
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Case-insensitive lookup.
    async fn find_by_email(&self, email: &str) -> Result<Option<Credential>, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Credential>, AppError>;

    /// Fails with `EmailAlreadyExists` on a duplicate email.
    async fn insert(&self, credential: &Credential) -> Result<(), AppError>;

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<(), AppError>;

    /// Marks the email verified and enables the account.
    async fn mark_verified(&self, user_id: Uuid) -> Result<(), AppError>;
}

pub struct PostgresCredentialStore {
    pool: PgPool,
}

impl PostgresCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

type CredentialRow = (Uuid, String, String, bool, bool, bool, Vec<String>);

fn row_to_credential(row: CredentialRow) -> Credential {
    Credential {
        id: row.0,
        email: row.1,
        password_hash: row.2,
        enabled: row.3,
        locked: row.4,
        email_verified: row.5,
        roles: row.6,
    }
}

#[async_trait]
impl CredentialStore for PostgresCredentialStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Credential>, AppError> {
        let row = sqlx::query_as::<_, CredentialRow>(
            r#"
            SELECT id, email, password_hash, enabled, locked, email_verified, roles
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_credential))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Credential>, AppError> {
        let row = sqlx::query_as::<_, CredentialRow>(
            r#"
            SELECT id, email, password_hash, enabled, locked, email_verified, roles
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_credential))
    }

    async fn insert(&self, credential: &Credential) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, enabled, locked, email_verified, roles, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(credential.id)
        .bind(&credential.email)
        .bind(&credential.password_hash)
        .bind(credential.enabled)
        .bind(credential.locked)
        .bind(credential.email_verified)
        .bind(&credential.roles)
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("duplicate key") => {
                Err(AppError::Registration(RegistrationError::EmailAlreadyExists))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(password_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_verified(&self, user_id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET email_verified = true, enabled = true WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// In-memory store for tests and single-process setups.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    by_id: Mutex<HashMap<Uuid, Credential>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Credential>, AppError> {
        let wanted = normalize_email(email);
        let map = self
            .by_id
            .lock()
            .map_err(|_| AppError::Internal("credential store lock poisoned".to_string()))?;
        Ok(map.values().find(|c| c.email == wanted).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Credential>, AppError> {
        let map = self
            .by_id
            .lock()
            .map_err(|_| AppError::Internal("credential store lock poisoned".to_string()))?;
        Ok(map.get(&id).cloned())
    }

    async fn insert(&self, credential: &Credential) -> Result<(), AppError> {
        let mut map = self
            .by_id
            .lock()
            .map_err(|_| AppError::Internal("credential store lock poisoned".to_string()))?;
        if map.values().any(|c| c.email == credential.email) {
            return Err(AppError::Registration(RegistrationError::EmailAlreadyExists));
        }
        map.insert(credential.id, credential.clone());
        Ok(())
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<(), AppError> {
        let mut map = self
            .by_id
            .lock()
            .map_err(|_| AppError::Internal("credential store lock poisoned".to_string()))?;
        if let Some(credential) = map.get_mut(&user_id) {
            credential.password_hash = password_hash.to_string();
        }
        Ok(())
    }

    async fn mark_verified(&self, user_id: Uuid) -> Result<(), AppError> {
        let mut map = self
            .by_id
            .lock()
            .map_err(|_| AppError::Internal("credential store lock poisoned".to_string()))?;
        if let Some(credential) = map.get_mut(&user_id) {
            credential.email_verified = true;
            credential.enabled = true;
        }
        Ok(())
    }
}
