/// The authentication service.
///
/// Composes the credential store, token issuer/codec, revocation store,
/// brute-force guard, reset ledger, and verification ledger behind one
/// interface. Every operation here is the complete server-side behavior of
/// one HTTP endpoint; the route handlers only deserialize and delegate.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::auth::{hash_password, verify_password, CachedClaimsCodec, TokenIssuer, TokenType};
use crate::brute_force::BruteForceGuard;
use crate::credentials::{normalize_email, Credential, CredentialStore};
use crate::email_client::Mailer;
use crate::error::{AppError, AuthError, RegistrationError, VerificationError};
use crate::events::{dispatch, AuthEvent, EventPublisher};
use crate::password_reset::{generate_reset_token, hash_token, PasswordResetLedger};
use crate::revocation::RevocationStore;
use crate::validators::is_valid_email;
use crate::verification::VerificationCodeLedger;

const DEFAULT_ROLE: &str = "ROLE_MEMBER";

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenValidation {
    pub valid: bool,
    pub user_id: Uuid,
    pub email: String,
    pub roles: Vec<String>,
    pub token_type: String,
}

pub struct AuthService {
    credentials: Arc<dyn CredentialStore>,
    issuer: TokenIssuer,
    codec: CachedClaimsCodec,
    revocation: RevocationStore,
    guard: BruteForceGuard,
    reset_ledger: PasswordResetLedger,
    verification: VerificationCodeLedger,
    mailer: Arc<dyn Mailer>,
    publisher: Arc<dyn EventPublisher>,
    frontend_url: String,
    refresh_token_expiry: Duration,
}

impl AuthService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        issuer: TokenIssuer,
        codec: CachedClaimsCodec,
        revocation: RevocationStore,
        guard: BruteForceGuard,
        reset_ledger: PasswordResetLedger,
        verification: VerificationCodeLedger,
        mailer: Arc<dyn Mailer>,
        publisher: Arc<dyn EventPublisher>,
        frontend_url: String,
        refresh_token_expiry: Duration,
    ) -> Self {
        Self {
            credentials,
            issuer,
            codec,
            revocation,
            guard,
            reset_ledger,
            verification,
            mailer,
            publisher,
            frontend_url,
            refresh_token_expiry,
        }
    }

    /// Authenticates a credential and mints an access/refresh token pair.
    ///
    /// Wrong password, unknown account, and disabled/locked account all
    /// collapse into `InvalidCredentials`. The guard counter is reset only
    /// after both tokens are minted, so an issuance failure never consumes
    /// the caller's remaining attempts.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        client_ip: &str,
    ) -> Result<TokenPair, AppError> {
        if self.guard.is_blocked(client_ip) {
            tracing::warn!(ip = %client_ip, "Login blocked by brute-force guard");
            return Err(AppError::Auth(AuthError::TooManyAttempts));
        }

        let credential = match self.credentials.find_by_email(email).await? {
            Some(c) => c,
            None => return Err(self.failed_login(client_ip, "unknown email")),
        };

        if !credential.can_login() {
            return Err(self.failed_login(client_ip, "account disabled or locked"));
        }

        if !verify_password(password, &credential.password_hash)? {
            return Err(self.failed_login(client_ip, "wrong password"));
        }

        let access_token = self.issuer.issue_access(&credential)?;
        let refresh_token = self.issuer.issue_refresh(&credential)?;
        self.guard.register_successful_attempt(client_ip);

        dispatch(
            self.publisher.clone(),
            AuthEvent::user_logged_in(credential.id),
        );
        tracing::info!(user_id = %credential.id, "Login succeeded");

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.issuer.access_token_expiry(),
        })
    }

    /// Mints a fresh access token from a refresh token. The refresh token
    /// itself is returned unchanged; it is never rotated and remains
    /// revocable only through the blacklist.
    pub fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        // Revocation is checked before any cryptographic work.
        if self.revocation.is_blacklisted(refresh_token) {
            return Err(AppError::Auth(AuthError::TokenRevoked));
        }

        let claims = self
            .codec
            .verify(refresh_token)
            .map_err(|_| AppError::Auth(AuthError::TokenInvalid))?;

        if claims.token_type != TokenType::Refresh || claims.is_expired() {
            return Err(AppError::Auth(AuthError::TokenInvalid));
        }

        if self.issued_before_user_cutoff(&claims)? {
            return Err(AppError::Auth(AuthError::TokenRevoked));
        }

        let access_token = self.issuer.issue_access_from_claims(&claims)?;
        Ok(TokenPair {
            access_token,
            refresh_token: refresh_token.to_string(),
            token_type: "Bearer".to_string(),
            expires_in: self.issuer.access_token_expiry(),
        })
    }

    /// Revokes a token for the remainder of its lifetime. Idempotent;
    /// accepts the raw token or the full `Authorization` header value.
    pub fn logout(&self, token: &str) -> Result<(), AppError> {
        let token = strip_bearer(token);
        if token.is_empty() {
            return Err(AppError::Auth(AuthError::MissingToken));
        }

        self.revocation.blacklist(token, &self.codec)?;
        Ok(())
    }

    /// Full validity check: revocation first, then signature, then expiry,
    /// then the user-wide cutoff.
    pub fn validate_token(&self, token: &str) -> Result<TokenValidation, AppError> {
        let token = strip_bearer(token);
        if token.is_empty() {
            return Err(AppError::Auth(AuthError::MissingToken));
        }

        if self.revocation.is_blacklisted(token) {
            return Err(AppError::Auth(AuthError::TokenRevoked));
        }

        let claims = self
            .codec
            .verify(token)
            .map_err(|_| AppError::Auth(AuthError::TokenInvalid))?;

        if claims.is_expired() {
            return Err(AppError::Auth(AuthError::TokenInvalid));
        }

        if self.issued_before_user_cutoff(&claims)? {
            return Err(AppError::Auth(AuthError::TokenRevoked));
        }

        Ok(TokenValidation {
            valid: true,
            user_id: claims.user_id()?,
            email: claims.sub.clone(),
            roles: claims.roles.clone(),
            token_type: claims.token_type.to_string(),
        })
    }

    /// Starts the password-reset flow. Always succeeds and returns the same
    /// response whether or not the account exists; the unknown-email branch
    /// performs the same token-generation work so the two cases are not
    /// trivially distinguishable. The remaining store write on the known
    /// path is the one difference.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AppError> {
        let email = normalize_email(email);
        let credential = self.credentials.find_by_email(&email).await?;

        match credential {
            Some(credential) => {
                let token = self.reset_ledger.request_reset(credential.id).await?;
                let reset_link = format!("{}/reset-password?token={}", self.frontend_url, token);

                self.send_mail(
                    &email,
                    "Password reset",
                    &format!(
                        "<p>Follow <a href=\"{}\">this link</a> to reset your password. \
                         The link expires in one hour.</p>",
                        reset_link
                    ),
                );
                dispatch(
                    self.publisher.clone(),
                    AuthEvent::password_reset_requested(email, reset_link),
                );
            }
            None => {
                // Match the real path's token-generation cost.
                let _ = hash_token(&generate_reset_token());
                tracing::info!("Password reset requested for unregistered email");
            }
        }

        Ok(())
    }

    /// Consumes a reset token, sets the new password, and revokes every
    /// session issued before this instant.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AppError> {
        // Password strength is validated before the single-use token is
        // consumed, so a weak password does not burn the token.
        let password_hash = hash_password(new_password)?;

        let user_id = self.reset_ledger.consume_reset(token).await?;

        // Sessions are revoked before the password is written: if either
        // step fails, the user is left locked out rather than reachable
        // through a stale session.
        let cutoff = chrono::Utc::now().timestamp();
        self.revocation
            .revoke_all_issued_before(user_id, cutoff, self.refresh_token_expiry)?;
        self.credentials
            .update_password(user_id, &password_hash)
            .await?;

        tracing::info!(user_id = %user_id, "Password reset completed");
        Ok(())
    }

    /// Registers a new account. It starts disabled and unverified; a
    /// verification code is issued and delivered out of band.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<Uuid, AppError> {
        let email = is_valid_email(email)?;

        if password != confirm_password {
            return Err(AppError::Registration(RegistrationError::PasswordMismatch));
        }

        let password_hash = hash_password(password)?;
        let credential =
            Credential::new_registration(email, password_hash, DEFAULT_ROLE.to_string());
        self.credentials.insert(&credential).await?;

        let code = self.verification.issue_code(&credential.email)?;
        self.send_mail(
            &credential.email,
            "Verify your email",
            &format!(
                "<p>Your verification code is <strong>{}</strong>. \
                 It expires in 15 minutes.</p>",
                code
            ),
        );
        dispatch(
            self.publisher.clone(),
            AuthEvent::user_registered(
                credential.id,
                credential.email.clone(),
                DEFAULT_ROLE.to_string(),
            ),
        );

        tracing::info!(user_id = %credential.id, "Account registered");
        Ok(credential.id)
    }

    /// Checks a verification code and enables the account on success.
    pub async fn verify_email(&self, email: &str, code: &str) -> Result<(), AppError> {
        let email = normalize_email(email);
        self.verification.verify(&email, code).await
    }

    /// Issues and delivers a fresh verification code, subject to the
    /// per-email issue cap.
    pub async fn resend_verification(&self, email: &str) -> Result<(), AppError> {
        let email = normalize_email(email);

        let credential = self
            .credentials
            .find_by_email(&email)
            .await?
            .ok_or(AppError::Verification(VerificationError::UserNotFound))?;

        if credential.email_verified || self.verification.is_recently_verified(&email) {
            return Err(AppError::Verification(VerificationError::AlreadyVerified));
        }

        let code = self.verification.issue_code(&email)?;
        self.send_mail(
            &email,
            "Verify your email",
            &format!(
                "<p>Your verification code is <strong>{}</strong>. \
                 It expires in 15 minutes.</p>",
                code
            ),
        );
        Ok(())
    }

    /// Removes expired entries across the in-process stores and the reset
    /// token table. Called from the periodic sweep task.
    pub async fn sweep_expired(&self) -> Result<(), AppError> {
        let pruned = self.revocation.prune_expired()
            + self.verification.prune_expired()
            + self.guard.prune_expired();
        if pruned > 0 {
            tracing::debug!(pruned = pruned, "Expired in-process entries pruned");
        }
        self.reset_ledger.sweep_expired().await?;
        Ok(())
    }

    fn failed_login(&self, client_ip: &str, reason: &str) -> AppError {
        self.guard.register_failed_attempt(client_ip);
        tracing::warn!(
            ip = %client_ip,
            reason = reason,
            remaining_attempts = self.guard.remaining_attempts(client_ip),
            "Login failed"
        );
        AppError::Auth(AuthError::InvalidCredentials)
    }

    fn issued_before_user_cutoff(&self, claims: &crate::auth::Claims) -> Result<bool, AppError> {
        let user_id = claims.user_id()?;
        Ok(matches!(
            self.revocation.user_cutoff(user_id),
            Some(cutoff) if claims.iat < cutoff
        ))
    }

    fn send_mail(&self, recipient: &str, subject: &str, html: &str) {
        let mailer = self.mailer.clone();
        let recipient = recipient.to_string();
        let subject = subject.to_string();
        let html = html.to_string();
        tokio::spawn(async move {
            if let Err(e) = mailer.send_email(&recipient, &subject, &html).await {
                tracing::error!(recipient = %recipient, error = %e, "Mail delivery failed");
            }
        });
    }
}

fn strip_bearer(value: &str) -> &str {
    value
        .strip_prefix("Bearer ")
        .unwrap_or(value)
        .trim()
}
