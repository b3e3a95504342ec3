/// Token revocation (blacklist).
///
/// A TTL-keyed set of revoked tokens. The TTL of each entry is derived from
/// the token's own remaining lifetime so an entry never outlives the token
/// it blocks by more than the clock skew of the fallback ceiling, and is
/// never evicted before the token would have expired naturally.
///
/// Consulted before signature verification on every authenticated request:
/// a revoked-but-still-cryptographically-valid token is rejected
/// deterministically. Writes are idempotent.
///
/// The store also records user-wide revocation cutoffs: after a password
/// reset, every token issued before the cutoff instant is treated as
/// revoked, which is how "invalidate all active sessions" is realized
/// without tracking tokens per user.

use std::time::Duration;

use uuid::Uuid;

use crate::auth::CachedClaimsCodec;
use crate::error::AppError;
use crate::ttl_cache::TtlCache;

const TOKEN_KEY_PREFIX: &str = "blacklist_token_";
const USER_KEY_PREFIX: &str = "blacklist_user_";

pub struct RevocationStore {
    entries: TtlCache<i64>,
    fallback_ttl: Duration,
}

impl RevocationStore {
    pub fn new(capacity: usize, fallback_ttl: Duration) -> Self {
        Self {
            entries: TtlCache::new(capacity),
            fallback_ttl,
        }
    }

    /// Blacklists a token for the remainder of its natural lifetime.
    ///
    /// - already expired: no-op, there is nothing left to protect against;
    /// - undecodable: stored with the fallback TTL rather than silently
    ///   dropped, trading precision for safety.
    ///
    /// # Errors
    /// `ServiceUnavailable` when the store is full: the caller gets a loud 503
    /// instead of a logout that silently left the token valid. Live entries
    /// are never evicted early to make room, since an evicted entry would
    /// re-admit a revoked token.
    pub fn blacklist(&self, token: &str, codec: &CachedClaimsCodec) -> Result<(), AppError> {
        let key = format!("{}{}", TOKEN_KEY_PREFIX, token);
        let now = chrono::Utc::now().timestamp();

        match codec.verify(token) {
            Ok(claims) => {
                let remaining = claims.remaining_seconds();
                if remaining > 0 {
                    self.store_entry(&key, now, Duration::from_secs(remaining as u64))?;
                    tracing::info!(ttl_seconds = remaining, "Token blacklisted");
                } else {
                    tracing::warn!("Token already expired, not adding to blacklist");
                }
            }
            Err(e) => {
                self.store_entry(&key, now, self.fallback_ttl)?;
                tracing::warn!(
                    error = %e,
                    fallback_seconds = self.fallback_ttl.as_secs(),
                    "Could not determine token expiration, using fallback TTL"
                );
            }
        }
        Ok(())
    }

    fn store_entry(&self, key: &str, value: i64, ttl: Duration) -> Result<(), AppError> {
        if self.entries.insert(key, value, ttl) {
            Ok(())
        } else {
            tracing::error!("Revocation store is full, refusing to drop the write");
            Err(AppError::ServiceUnavailable(
                "revocation store is full".to_string(),
            ))
        }
    }

    /// O(1) membership check.
    pub fn is_blacklisted(&self, token: &str) -> bool {
        self.entries
            .contains(&format!("{}{}", TOKEN_KEY_PREFIX, token))
    }

    /// Records that every token of `user_id` issued before `cutoff`
    /// (Unix seconds) is revoked. `ttl` should cover the longest token
    /// lifetime still outstanding (the refresh TTL).
    ///
    /// # Errors
    /// `ServiceUnavailable` when the store is full, same contract as `blacklist`.
    pub fn revoke_all_issued_before(
        &self,
        user_id: Uuid,
        cutoff: i64,
        ttl: Duration,
    ) -> Result<(), AppError> {
        let key = format!("{}{}", USER_KEY_PREFIX, user_id);
        self.store_entry(&key, cutoff, ttl)?;
        tracing::info!(user_id = %user_id, cutoff = cutoff, "All prior sessions revoked for user");
        Ok(())
    }

    /// The user's revocation cutoff, if one is active.
    pub fn user_cutoff(&self, user_id: Uuid) -> Option<i64> {
        self.entries.get(&format!("{}{}", USER_KEY_PREFIX, user_id))
    }

    pub fn prune_expired(&self) -> usize {
        self.entries.prune_expired()
    }
}
