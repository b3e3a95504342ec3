/// Token verification
///
/// `ClaimsCodec` is a pure function from a raw token to structured claims:
/// RS256 signature and issuer are checked, but expiration is NOT. Some
/// callers (role introspection, blacklist TTL derivation) legitimately need
/// the claims of an expired token, so expiry is always the caller's check.
///
/// `CachedClaimsCodec` decorates the codec with a bounded short-TTL cache
/// keyed by the raw token string, skipping repeated signature verification.
/// The cache is purely an optimization: behavior is identical with caching
/// disabled.

use std::time::Duration;

use jsonwebtoken::{decode, Algorithm, Validation};

use crate::auth::claims::Claims;
use crate::keys::KeyProvider;
use crate::ttl_cache::TtlCache;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// Cryptographic signature or issuer check failed.
    InvalidSignature,
    /// Structural decode failed (not a JWT, bad base64/JSON, missing claims).
    Malformed,
}

impl std::fmt::Display for VerifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifyError::InvalidSignature => write!(f, "token signature verification failed"),
            VerifyError::Malformed => write!(f, "token is structurally malformed"),
        }
    }
}

impl std::error::Error for VerifyError {}

#[derive(Clone)]
pub struct ClaimsCodec {
    keys: KeyProvider,
    validation: Validation,
}

impl ClaimsCodec {
    pub fn new(keys: KeyProvider, issuer: &str) -> Self {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[issuer]);
        // Expiration is checked by callers, never here.
        validation.validate_exp = false;

        Self { keys, validation }
    }

    /// Verifies the token and returns its claims. Succeeds for
    /// expired-but-well-formed tokens.
    pub fn verify(&self, token: &str) -> Result<Claims, VerifyError> {
        decode::<Claims>(token, self.keys.decoding_key(), &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::InvalidSignature
                | jsonwebtoken::errors::ErrorKind::InvalidIssuer
                | jsonwebtoken::errors::ErrorKind::InvalidAlgorithm
                | jsonwebtoken::errors::ErrorKind::ImmatureSignature => {
                    VerifyError::InvalidSignature
                }
                _ => VerifyError::Malformed,
            })
    }
}

/// Caching decorator over `ClaimsCodec`.
pub struct CachedClaimsCodec {
    codec: ClaimsCodec,
    cache: Option<TtlCache<Claims>>,
    ttl: Duration,
}

impl CachedClaimsCodec {
    pub fn new(codec: ClaimsCodec, capacity: usize, ttl: Duration) -> Self {
        Self {
            codec,
            cache: Some(TtlCache::new(capacity)),
            ttl,
        }
    }

    /// A decorator with the cache turned off; verification behaves
    /// identically, every call hits the signature check.
    pub fn disabled(codec: ClaimsCodec) -> Self {
        Self {
            codec,
            cache: None,
            ttl: Duration::from_secs(0),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, VerifyError> {
        if let Some(cache) = &self.cache {
            if let Some(claims) = cache.get(token) {
                return Ok(claims);
            }
        }

        let claims = self.codec.verify(token)?;

        if let Some(cache) = &self.cache {
            cache.insert(token, claims.clone(), self.ttl);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::TokenType;
    use crate::auth::issuer::TokenIssuer;
    use uuid::Uuid;

    const TEST_PRIVATE_PEM: &str = include_str!("../../keys/local-only/private_key.pem");
    const TEST_PUBLIC_PEM: &str = include_str!("../../keys/local-only/public_key.pem");

    fn test_keys() -> KeyProvider {
        KeyProvider::from_pems(Some(TEST_PRIVATE_PEM.as_bytes()), TEST_PUBLIC_PEM.as_bytes())
            .expect("Failed to load test keys")
    }

    fn test_issuer(keys: &KeyProvider) -> TokenIssuer {
        TokenIssuer::new(keys, "test".to_string(), 900, 604800)
            .expect("Failed to build token issuer")
    }

    fn signed_claims(issuer: &TokenIssuer, expiry_seconds: i64) -> String {
        issuer
            .sign(Claims::new(
                Uuid::new_v4(),
                "member@example.com".to_string(),
                vec!["ROLE_MEMBER".to_string()],
                TokenType::Access,
                expiry_seconds,
                "test".to_string(),
            ))
            .expect("Failed to sign claims")
    }

    #[test]
    fn verify_roundtrip() {
        let keys = test_keys();
        let token = signed_claims(&test_issuer(&keys), 900);
        let codec = ClaimsCodec::new(keys, "test");

        let claims = codec.verify(&token).expect("Failed to verify token");
        assert_eq!(claims.sub, "member@example.com");
        assert_eq!(claims.token_type, TokenType::Access);
    }

    #[test]
    fn expired_token_still_decodes() {
        let keys = test_keys();
        let token = signed_claims(&test_issuer(&keys), -3600);
        let codec = ClaimsCodec::new(keys, "test");

        let claims = codec.verify(&token).expect("Expired token must decode");
        assert!(claims.is_expired());
    }

    #[test]
    fn tampered_token_fails_signature_check() {
        let keys = test_keys();
        let token = signed_claims(&test_issuer(&keys), 900);
        let codec = ClaimsCodec::new(keys, "test");

        let mut tampered = token;
        tampered.pop();
        tampered.push('A');
        assert_eq!(codec.verify(&tampered), Err(VerifyError::InvalidSignature));
    }

    #[test]
    fn garbage_is_malformed() {
        let codec = ClaimsCodec::new(test_keys(), "test");
        assert_eq!(
            codec.verify("definitely.not.a-jwt"),
            Err(VerifyError::Malformed)
        );
    }

    #[test]
    fn wrong_issuer_is_rejected() {
        let keys = test_keys();
        let token = signed_claims(&test_issuer(&keys), 900);
        let codec = ClaimsCodec::new(keys, "some-other-service");

        assert_eq!(codec.verify(&token), Err(VerifyError::InvalidSignature));
    }

    #[test]
    fn cached_and_uncached_agree() {
        let keys = test_keys();
        let token = signed_claims(&test_issuer(&keys), 900);
        let cached = CachedClaimsCodec::new(
            ClaimsCodec::new(keys.clone(), "test"),
            128,
            Duration::from_secs(300),
        );
        let uncached = CachedClaimsCodec::disabled(ClaimsCodec::new(keys, "test"));

        let a = cached.verify(&token).unwrap();
        // Second call served from cache.
        let b = cached.verify(&token).unwrap();
        let c = uncached.verify(&token).unwrap();

        assert_eq!(a.sub, b.sub);
        assert_eq!(a.exp, b.exp);
        assert_eq!(a.sub, c.sub);
        assert_eq!(a.exp, c.exp);
    }

    #[test]
    fn cache_does_not_store_failures() {
        let keys = test_keys();
        let cached = CachedClaimsCodec::new(
            ClaimsCodec::new(keys, "test"),
            128,
            Duration::from_secs(300),
        );

        assert!(cached.verify("garbage").is_err());
        assert!(cached.verify("garbage").is_err());
    }
}
