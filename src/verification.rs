/// Email verification codes.
///
/// Six-digit numeric codes delivered out of band. A code lives 15 minutes
/// and tolerates at most 5 wrong guesses before it is burned; issuing is
/// capped at 3 codes per email per hour. All state lives in the shared TTL
/// store, so an expired code simply reads as absent.

use std::sync::Arc;
use std::time::Duration;

use rand::{thread_rng, Rng};

use crate::credentials::CredentialStore;
use crate::error::{AppError, VerificationError};
use crate::ttl_cache::{TtlCache, Update};

const CODE_TTL: Duration = Duration::from_secs(15 * 60);
const MAX_ATTEMPTS_PER_CODE: u32 = 5;
const MAX_CODES_PER_WINDOW: u32 = 3;
const RATE_WINDOW_SECONDS: i64 = 3600;
const RECENTLY_VERIFIED_TTL: Duration = Duration::from_secs(10 * 60);

const CODE_KEY_PREFIX: &str = "verify_code_";
const RATE_KEY_PREFIX: &str = "verify_rate_";
const DONE_KEY_PREFIX: &str = "verify_done_";

#[derive(Clone)]
struct CodeEntry {
    code: String,
    attempts: u32,
    expires_at: i64,
}

#[derive(Clone)]
struct RateWindow {
    count: u32,
    ends_at: i64,
}

pub struct VerificationCodeLedger {
    codes: TtlCache<CodeEntry>,
    rate: TtlCache<RateWindow>,
    recently_verified: TtlCache<bool>,
    store: Arc<dyn CredentialStore>,
}

impl VerificationCodeLedger {
    pub fn new(capacity: usize, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            codes: TtlCache::new(capacity),
            rate: TtlCache::new(capacity),
            recently_verified: TtlCache::new(capacity),
            store,
        }
    }

    /// Mints a fresh code for the email, replacing any outstanding one and
    /// resetting its attempt count. Returns the code for out-of-band
    /// delivery.
    ///
    /// # Errors
    /// `TooManyCodeRequests` once the hourly issue cap is hit.
    pub fn issue_code(&self, email: &str) -> Result<String, AppError> {
        let now = chrono::Utc::now().timestamp();
        self.register_issue(email, now)?;

        let code = generate_code();
        self.codes.insert_or_evict(
            &format!("{}{}", CODE_KEY_PREFIX, email),
            CodeEntry {
                code: code.clone(),
                attempts: 0,
                expires_at: now + CODE_TTL.as_secs() as i64,
            },
            CODE_TTL,
        );

        tracing::info!(email = %email, "Verification code issued");
        Ok(code)
    }

    /// Checks a submitted code and, on success, marks the credential
    /// verified and enabled.
    ///
    /// # Errors
    /// - `UserNotFound` / `AlreadyVerified` from the credential lookup;
    /// - `CodeExpired` when no live code exists for the email;
    /// - `MaxAttemptsExceeded` once the guess budget is spent (the code is
    ///   burned, a new one must be issued);
    /// - `InvalidCode` on a wrong guess with budget remaining.
    pub async fn verify(&self, email: &str, submitted: &str) -> Result<(), AppError> {
        let credential = self
            .store
            .find_by_email(email)
            .await?
            .ok_or(AppError::Verification(VerificationError::UserNotFound))?;

        if credential.email_verified {
            return Err(AppError::Verification(VerificationError::AlreadyVerified));
        }

        let key = format!("{}{}", CODE_KEY_PREFIX, email);
        let now = chrono::Utc::now().timestamp();

        // The attempt counter is checked and advanced in one atomic pass so
        // concurrent guesses cannot each observe the same count. The
        // write-back keeps the original deadline; retries never extend the
        // code's lifetime.
        let outcome: Result<(), VerificationError> = self.codes.update(&key, |entry| {
            let entry = match entry {
                Some(entry) => entry,
                None => return (Update::Keep, Err(VerificationError::CodeExpired)),
            };
            if entry.code != submitted {
                let attempts = entry.attempts + 1;
                if attempts >= MAX_ATTEMPTS_PER_CODE {
                    return (Update::Remove, Err(VerificationError::MaxAttemptsExceeded));
                }
                let remaining = entry.expires_at - now;
                if remaining <= 0 {
                    return (Update::Remove, Err(VerificationError::CodeExpired));
                }
                return (
                    Update::Put(
                        CodeEntry {
                            attempts,
                            ..entry.clone()
                        },
                        Duration::from_secs(remaining as u64),
                    ),
                    Err(VerificationError::InvalidCode),
                );
            }
            (Update::Remove, Ok(()))
        });

        if let Err(e) = outcome {
            if matches!(e, VerificationError::MaxAttemptsExceeded) {
                tracing::warn!(email = %email, "Verification code burned after too many attempts");
            }
            return Err(AppError::Verification(e));
        }

        self.store.mark_verified(credential.id).await?;
        self.recently_verified.insert(
            &format!("{}{}", DONE_KEY_PREFIX, email),
            true,
            RECENTLY_VERIFIED_TTL,
        );

        tracing::info!(user_id = %credential.id, "Email verified");
        Ok(())
    }

    /// Whether the email completed verification within the recent window.
    pub fn is_recently_verified(&self, email: &str) -> bool {
        self.recently_verified
            .contains(&format!("{}{}", DONE_KEY_PREFIX, email))
    }

    pub fn prune_expired(&self) -> usize {
        self.codes.prune_expired() + self.rate.prune_expired() + self.recently_verified.prune_expired()
    }

    /// Issue-rate accounting: a window is anchored at the first issue and
    /// never slides. Checked and incremented in one atomic pass so
    /// concurrent issues cannot each observe the same count.
    fn register_issue(&self, email: &str, now: i64) -> Result<(), AppError> {
        let key = format!("{}{}", RATE_KEY_PREFIX, email);

        let admitted = self.rate.update(&key, |window| match window {
            Some(window) if window.count >= MAX_CODES_PER_WINDOW => (Update::Keep, false),
            Some(window) => {
                let remaining = (window.ends_at - now).max(1);
                (
                    Update::Put(
                        RateWindow {
                            count: window.count + 1,
                            ends_at: window.ends_at,
                        },
                        Duration::from_secs(remaining as u64),
                    ),
                    true,
                )
            }
            None => (
                Update::Put(
                    RateWindow {
                        count: 1,
                        ends_at: now + RATE_WINDOW_SECONDS,
                    },
                    Duration::from_secs(RATE_WINDOW_SECONDS as u64),
                ),
                true,
            ),
        });

        if admitted {
            Ok(())
        } else {
            tracing::warn!(email = %email, "Verification code issue rate exceeded");
            Err(AppError::Verification(
                VerificationError::TooManyCodeRequests,
            ))
        }
    }
}

fn generate_code() -> String {
    format!("{:06}", thread_rng().gen_range(0..1_000_000))
}
