/// Token issuance
///
/// Mints RS256-signed access and refresh tokens bound to a credential.
/// Only processes holding the private key can construct an issuer; any
/// service with the public key can validate but never forge.

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};

use crate::auth::claims::{Claims, TokenType};
use crate::credentials::Credential;
use crate::error::AppError;
use crate::keys::KeyProvider;

pub struct TokenIssuer {
    encoding_key: EncodingKey,
    issuer: String,
    access_token_expiry: i64,
    refresh_token_expiry: i64,
}

impl TokenIssuer {
    /// # Errors
    /// Fails when the provider holds no private key.
    pub fn new(
        keys: &KeyProvider,
        issuer: String,
        access_token_expiry: i64,
        refresh_token_expiry: i64,
    ) -> Result<Self, AppError> {
        Ok(Self {
            encoding_key: keys.encoding_key()?.clone(),
            issuer,
            access_token_expiry,
            refresh_token_expiry,
        })
    }

    /// Short-lived token carrying the credential's identity and roles.
    pub fn issue_access(&self, credential: &Credential) -> Result<String, AppError> {
        self.sign(Claims::new(
            credential.id,
            credential.email.clone(),
            credential.roles.clone(),
            TokenType::Access,
            self.access_token_expiry,
            self.issuer.clone(),
        ))
    }

    /// Long-lived token used only to mint new access tokens.
    pub fn issue_refresh(&self, credential: &Credential) -> Result<String, AppError> {
        self.sign(Claims::new(
            credential.id,
            credential.email.clone(),
            credential.roles.clone(),
            TokenType::Refresh,
            self.refresh_token_expiry,
            self.issuer.clone(),
        ))
    }

    /// Re-mints an access token for the identity carried by verified
    /// refresh claims. The caller is responsible for type, expiry, and
    /// revocation checks before calling this.
    pub fn issue_access_from_claims(&self, refresh_claims: &Claims) -> Result<String, AppError> {
        let user_id = refresh_claims.user_id()?;
        self.sign(Claims::new(
            user_id,
            refresh_claims.sub.clone(),
            refresh_claims.roles.clone(),
            TokenType::Access,
            self.access_token_expiry,
            self.issuer.clone(),
        ))
    }

    pub fn access_token_expiry(&self) -> i64 {
        self.access_token_expiry
    }

    pub(crate) fn sign(&self, claims: Claims) -> Result<String, AppError> {
        encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::codec::ClaimsCodec;
    use uuid::Uuid;

    const TEST_PRIVATE_PEM: &str = include_str!("../../keys/local-only/private_key.pem");
    const TEST_PUBLIC_PEM: &str = include_str!("../../keys/local-only/public_key.pem");

    fn test_keys() -> KeyProvider {
        KeyProvider::from_pems(Some(TEST_PRIVATE_PEM.as_bytes()), TEST_PUBLIC_PEM.as_bytes())
            .expect("Failed to load test keys")
    }

    fn member() -> Credential {
        Credential {
            id: Uuid::new_v4(),
            email: "member@example.com".to_string(),
            password_hash: "$2b$04$unused".to_string(),
            enabled: true,
            locked: false,
            email_verified: true,
            roles: vec!["ROLE_MEMBER".to_string()],
        }
    }

    #[test]
    fn access_and_refresh_carry_distinct_types_and_ttls() {
        let keys = test_keys();
        let issuer = TokenIssuer::new(&keys, "test".to_string(), 900, 604800).unwrap();
        let codec = ClaimsCodec::new(keys, "test");
        let credential = member();

        let access = codec
            .verify(&issuer.issue_access(&credential).unwrap())
            .unwrap();
        let refresh = codec
            .verify(&issuer.issue_refresh(&credential).unwrap())
            .unwrap();

        assert_eq!(access.token_type, TokenType::Access);
        assert_eq!(refresh.token_type, TokenType::Refresh);
        assert!(refresh.exp > access.exp);
        assert_eq!(access.sub, credential.email);
        assert_eq!(access.user_id().unwrap(), credential.id);
        assert_eq!(access.roles, credential.roles);
    }

    #[test]
    fn refreshed_access_token_preserves_identity_exactly() {
        let keys = test_keys();
        let issuer = TokenIssuer::new(&keys, "test".to_string(), 900, 604800).unwrap();
        let codec = ClaimsCodec::new(keys, "test");
        let credential = member();

        let refresh_claims = codec
            .verify(&issuer.issue_refresh(&credential).unwrap())
            .unwrap();
        let new_access = codec
            .verify(&issuer.issue_access_from_claims(&refresh_claims).unwrap())
            .unwrap();

        assert_eq!(new_access.token_type, TokenType::Access);
        assert_eq!(new_access.user_id, refresh_claims.user_id);
        assert_eq!(new_access.sub, refresh_claims.sub);
        assert_eq!(new_access.roles, refresh_claims.roles);
    }

    #[test]
    fn verification_only_keys_cannot_build_issuer() {
        let keys = KeyProvider::verification_only(TEST_PUBLIC_PEM.as_bytes()).unwrap();
        assert!(TokenIssuer::new(&keys, "test".to_string(), 900, 604800).is_err());
    }
}
