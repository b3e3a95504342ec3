/// JWT Claims structure
///
/// Payload embedded in and cryptographically bound to every issued token:
/// user identity, roles, and a token-type discriminator alongside the
/// standard JWT claims (RFC 7519).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Discriminates access tokens from refresh tokens.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenType {
    Access,
    Refresh,
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenType::Access => write!(f, "ACCESS"),
            TokenType::Refresh => write!(f, "REFRESH"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    /// Subject (user email)
    pub sub: String,
    /// User ID as UUID string
    pub user_id: String,
    /// Role names granted to the user
    pub roles: Vec<String>,
    /// ACCESS or REFRESH
    pub token_type: TokenType,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Issuer
    pub iss: String,
}

impl Claims {
    pub fn new(
        user_id: Uuid,
        email: String,
        roles: Vec<String>,
        token_type: TokenType,
        expiry_seconds: i64,
        issuer: String,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: email,
            user_id: user_id.to_string(),
            roles,
            token_type,
            exp: now + expiry_seconds,
            iat: now,
            iss: issuer,
        }
    }

    /// # Errors
    /// Returns error if the embedded user ID is not a valid UUID
    pub fn user_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.user_id)
            .map_err(|_| AppError::Internal("Invalid user ID in token".to_string()))
    }

    pub fn is_expired(&self) -> bool {
        let now = chrono::Utc::now().timestamp();
        self.exp < now
    }

    /// Seconds until natural expiry; zero or negative when already expired.
    pub fn remaining_seconds(&self) -> i64 {
        self.exp - chrono::Utc::now().timestamp()
    }
}
