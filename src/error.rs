/// Unified error handling for the authentication service.
///
/// Domain-specific error enums are aggregated into a central `AppError`
/// which maps every failure to one fixed HTTP status / error-code pair.
/// Security-sensitive outcomes (wrong password, disabled account, unknown
/// email) are deliberately collapsed into `InvalidCredentials` so callers
/// cannot infer account existence or state. Infrastructure failures are a
/// distinct class and are never coerced into a security-relevant outcome.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::error::Error as StdError;
use std::fmt;

/// Input validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    EmptyField(String),
    TooShort(String, usize),
    TooLong(String, usize),
    InvalidFormat(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "{} is empty", field),
            ValidationError::TooShort(field, min) => {
                write!(f, "{} is too short (minimum {} characters)", field, min)
            }
            ValidationError::TooLong(field, max) => {
                write!(f, "{} is too long (maximum {} characters)", field, max)
            }
            ValidationError::InvalidFormat(field) => write!(f, "{} has invalid format", field),
        }
    }
}

impl StdError for ValidationError {}

/// Authentication and token lifecycle errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Wrong password, unknown account, disabled or locked account.
    /// Not distinguished to the caller.
    InvalidCredentials,
    /// Brute-force threshold exceeded for the client IP.
    TooManyAttempts,
    /// Malformed token, bad signature, wrong type, or expired.
    TokenInvalid,
    /// Token is on the blacklist or predates a user-wide revocation.
    TokenRevoked,
    MissingToken,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::InvalidCredentials => write!(f, "Invalid credentials"),
            AuthError::TooManyAttempts => write!(f, "Too many attempts. Please try again later."),
            AuthError::TokenInvalid => write!(f, "Invalid or expired token"),
            AuthError::TokenRevoked => write!(f, "Token has been revoked"),
            AuthError::MissingToken => write!(f, "Authorization header is missing or invalid"),
        }
    }
}

impl StdError for AuthError {}

/// Password-reset token states.
///
/// Distinguished to the caller, unlike login failures: reset flows are not
/// security-sensitive to the same degree. Precedence on consume is
/// missing -> Invalid, expired -> Expired (before the used check),
/// used -> Used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetError {
    TokenInvalid,
    TokenExpired,
    TokenUsed,
}

impl fmt::Display for ResetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResetError::TokenInvalid => write!(f, "Invalid password reset token"),
            ResetError::TokenExpired => write!(f, "Password reset token expired"),
            ResetError::TokenUsed => write!(f, "Password reset token already used"),
        }
    }
}

impl StdError for ResetError {}

/// Registration errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    EmailAlreadyExists,
    PasswordMismatch,
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationError::EmailAlreadyExists => write!(f, "Email already exists"),
            RegistrationError::PasswordMismatch => write!(f, "Password mismatch"),
        }
    }
}

impl StdError for RegistrationError {}

/// Email verification code errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    InvalidCode,
    CodeExpired,
    AlreadyVerified,
    TooManyCodeRequests,
    MaxAttemptsExceeded,
    UserNotFound,
}

impl fmt::Display for VerificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationError::InvalidCode => write!(f, "Invalid verification code"),
            VerificationError::CodeExpired => write!(f, "Verification code expired"),
            VerificationError::AlreadyVerified => write!(f, "Email already verified"),
            VerificationError::TooManyCodeRequests => write!(f, "Too many email attempts"),
            VerificationError::MaxAttemptsExceeded => {
                write!(f, "Maximum verification attempts exceeded")
            }
            VerificationError::UserNotFound => write!(f, "User not found"),
        }
    }
}

impl StdError for VerificationError {}

/// Database operation errors
#[derive(Debug)]
pub enum DatabaseError {
    UniqueConstraintViolation(String),
    NotFound(String),
    QueryExecution(String),
    ConnectionPool(String),
    UnexpectedError(String),
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseError::UniqueConstraintViolation(msg) => {
                write!(f, "Duplicate entry: {}", msg)
            }
            DatabaseError::NotFound(msg) => write!(f, "Not found: {}", msg),
            DatabaseError::QueryExecution(msg) => write!(f, "Query error: {}", msg),
            DatabaseError::ConnectionPool(msg) => write!(f, "Database connection error: {}", msg),
            DatabaseError::UnexpectedError(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl StdError for DatabaseError {}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    MissingRequired(String),
    InvalidValue(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingRequired(msg) => write!(f, "Missing required config: {}", msg),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config value: {}", msg),
        }
    }
}

impl StdError for ConfigError {}

/// Central error type that all application errors map to
#[derive(Debug)]
pub enum AppError {
    Validation(ValidationError),
    Auth(AuthError),
    Reset(ResetError),
    Registration(RegistrationError),
    Verification(VerificationError),
    Database(DatabaseError),
    Config(ConfigError),
    /// An in-process store refused a write it must not drop silently.
    ServiceUnavailable(String),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "{}", e),
            AppError::Auth(e) => write!(f, "{}", e),
            AppError::Reset(e) => write!(f, "{}", e),
            AppError::Registration(e) => write!(f, "{}", e),
            AppError::Verification(e) => write!(f, "{}", e),
            AppError::Database(e) => write!(f, "{}", e),
            AppError::Config(e) => write!(f, "{}", e),
            AppError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for AppError {}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<ResetError> for AppError {
    fn from(err: ResetError) -> Self {
        AppError::Reset(err)
    }
}

impl From<RegistrationError> for AppError {
    fn from(err: RegistrationError) -> Self {
        AppError::Registration(err)
    }
}

impl From<VerificationError> for AppError {
    fn from(err: VerificationError) -> Self {
        AppError::Verification(err)
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        AppError::Database(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        let error_msg = err.to_string();

        if error_msg.contains("duplicate key") || error_msg.contains("unique constraint") {
            AppError::Database(DatabaseError::UniqueConstraintViolation(
                "Record already exists".to_string(),
            ))
        } else if error_msg.contains("no rows") {
            AppError::Database(DatabaseError::NotFound("Record not found".to_string()))
        } else if error_msg.contains("pool") || error_msg.contains("connect") {
            AppError::Database(DatabaseError::ConnectionPool(error_msg))
        } else {
            AppError::Database(DatabaseError::UnexpectedError(error_msg))
        }
    }
}

/// Error response body returned to clients.
/// Internal detail never leaks; `code` is a stable machine-readable tag.
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    pub error_id: String,
    pub message: String,
    pub code: String,
    pub status: u16,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: String, code: String, status: u16) -> Self {
        Self {
            error_id,
            message,
            code,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl AppError {
    /// Fixed status/code pair for every taxonomy member.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::Auth(e) => match e {
                AuthError::InvalidCredentials => {
                    (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS")
                }
                AuthError::TooManyAttempts => (StatusCode::TOO_MANY_REQUESTS, "TOO_MANY_ATTEMPTS"),
                AuthError::TokenInvalid => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN"),
                AuthError::TokenRevoked => (StatusCode::UNAUTHORIZED, "TOKEN_REVOKED"),
                AuthError::MissingToken => (StatusCode::BAD_REQUEST, "MISSING_TOKEN"),
            },
            AppError::Reset(e) => match e {
                ResetError::TokenInvalid => {
                    (StatusCode::BAD_REQUEST, "PASSWORD_RESET_TOKEN_INVALID")
                }
                ResetError::TokenExpired => {
                    (StatusCode::BAD_REQUEST, "PASSWORD_RESET_TOKEN_EXPIRED")
                }
                ResetError::TokenUsed => (StatusCode::BAD_REQUEST, "PASSWORD_RESET_TOKEN_USED"),
            },
            AppError::Registration(e) => match e {
                RegistrationError::EmailAlreadyExists => {
                    (StatusCode::CONFLICT, "EMAIL_ALREADY_EXISTS")
                }
                RegistrationError::PasswordMismatch => {
                    (StatusCode::BAD_REQUEST, "PASSWORD_MISMATCH")
                }
            },
            AppError::Verification(e) => match e {
                VerificationError::InvalidCode => {
                    (StatusCode::BAD_REQUEST, "INVALID_VERIFICATION_CODE")
                }
                VerificationError::CodeExpired => {
                    (StatusCode::BAD_REQUEST, "VERIFICATION_CODE_EXPIRED")
                }
                VerificationError::AlreadyVerified => {
                    (StatusCode::BAD_REQUEST, "EMAIL_ALREADY_VERIFIED")
                }
                VerificationError::TooManyCodeRequests => {
                    (StatusCode::TOO_MANY_REQUESTS, "TOO_MANY_EMAIL_ATTEMPTS")
                }
                VerificationError::MaxAttemptsExceeded => (
                    StatusCode::TOO_MANY_REQUESTS,
                    "MAX_VERIFICATION_ATTEMPTS_EXCEEDED",
                ),
                VerificationError::UserNotFound => (StatusCode::NOT_FOUND, "USER_NOT_FOUND"),
            },
            AppError::Database(e) => match e {
                DatabaseError::UniqueConstraintViolation(_) => {
                    (StatusCode::CONFLICT, "DUPLICATE_ENTRY")
                }
                DatabaseError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                DatabaseError::ConnectionPool(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE")
                }
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            },
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            AppError::ServiceUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE")
            }
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    /// Message safe to show to a client. Infrastructure detail is masked.
    fn public_message(&self) -> String {
        match self {
            AppError::Database(DatabaseError::ConnectionPool(_)) => {
                "Service temporarily unavailable".to_string()
            }
            AppError::Database(_) => "Database error occurred".to_string(),
            AppError::Config(_) => "Server configuration error".to_string(),
            AppError::ServiceUnavailable(_) => "Service temporarily unavailable".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    fn log(&self, request_id: &str) {
        match self {
            AppError::Validation(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Validation error");
            }
            AppError::Auth(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Authentication failure");
            }
            AppError::Reset(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Password reset failure");
            }
            AppError::Registration(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Registration failure");
            }
            AppError::Verification(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Email verification failure");
            }
            AppError::Database(e) => {
                tracing::error!(request_id = request_id, error = %e, "Database error");
            }
            AppError::Config(e) => {
                tracing::error!(request_id = request_id, error = %e, "Configuration error");
            }
            AppError::ServiceUnavailable(msg) => {
                tracing::error!(request_id = request_id, error = %msg, "Service unavailable");
            }
            AppError::Internal(msg) => {
                tracing::error!(request_id = request_id, error = %msg, "Internal error");
            }
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.log(&request_id);

        let (status, code) = self.status_and_code();
        let body = ErrorResponse::new(
            request_id,
            self.public_message(),
            code.to_string(),
            status.as_u16(),
        );

        HttpResponse::build(status).json(body)
    }

    fn status_code(&self) -> StatusCode {
        self.status_and_code().0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_failures_collapse_to_one_code() {
        let (status, code) = AppError::Auth(AuthError::InvalidCredentials).status_and_code();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(code, "INVALID_CREDENTIALS");
    }

    #[test]
    fn reset_token_states_have_distinct_codes() {
        let codes: Vec<&str> = [
            ResetError::TokenInvalid,
            ResetError::TokenExpired,
            ResetError::TokenUsed,
        ]
        .into_iter()
        .map(|e| AppError::Reset(e).status_and_code().1)
        .collect();

        assert_eq!(
            codes,
            vec![
                "PASSWORD_RESET_TOKEN_INVALID",
                "PASSWORD_RESET_TOKEN_EXPIRED",
                "PASSWORD_RESET_TOKEN_USED",
            ]
        );
    }

    #[test]
    fn throttling_maps_to_429() {
        let (status, code) = AppError::Auth(AuthError::TooManyAttempts).status_and_code();
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(code, "TOO_MANY_ATTEMPTS");
    }

    #[test]
    fn infrastructure_errors_mask_detail() {
        let err = AppError::Database(DatabaseError::ConnectionPool(
            "postgres://secret@host".to_string(),
        ));
        assert_eq!(err.public_message(), "Service temporarily unavailable");
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
