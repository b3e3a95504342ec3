/// Authentication Routes
///
/// Thin handlers over `AuthService`: deserialize, pick up the client
/// address where the guard needs it, delegate, serialize. All domain
/// decisions live in the service.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AuthError};
use crate::service::{AuthService, TokenValidation};

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Deserialize)]
pub struct VerifyEmailRequest {
    pub email: String,
    pub code: String,
}

#[derive(Deserialize)]
pub struct ResendVerificationRequest {
    pub email: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub user_id: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub roles: Vec<String>,
}

/// POST /api/v1/auth/register
///
/// New accounts start disabled; a verification code is sent by email.
///
/// # Errors
/// - 400: Validation errors, password mismatch
/// - 409: Email already registered
pub async fn register(
    form: web::Json<RegisterRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let user_id = auth
        .register(&form.email, &form.password, &form.confirm_password)
        .await?;

    Ok(HttpResponse::Created().json(RegisterResponse {
        user_id: user_id.to_string(),
        message: "Registration successful. Check your email for a verification code.".to_string(),
    }))
}

/// POST /api/v1/auth/login
///
/// # Errors
/// - 401: Invalid credentials (one code for wrong password, unknown email,
///   and disabled/locked accounts)
/// - 429: Too many failed attempts from this address
pub async fn login(
    form: web::Json<LoginRequest>,
    auth: web::Data<AuthService>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let client_ip = client_ip(&req);
    let pair = auth.login(&form.email, &form.password, &client_ip).await?;
    Ok(HttpResponse::Ok().json(pair))
}

/// POST /api/v1/auth/refresh-token
///
/// Returns a fresh access token alongside the unchanged refresh token.
///
/// # Errors
/// - 401: Invalid, expired, wrong-type, or revoked refresh token
pub async fn refresh_token(
    form: web::Json<RefreshRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let pair = auth.refresh_access_token(&form.refresh_token)?;
    Ok(HttpResponse::Ok().json(pair))
}

/// POST /api/v1/auth/logout
///
/// Revokes the presented token. Idempotent.
///
/// # Errors
/// - 400: Missing Authorization header
pub async fn logout(
    req: HttpRequest,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let header = authorization_header(&req)?;
    auth.logout(header)?;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Logged out".to_string(),
    }))
}

/// POST /api/v1/auth/validate-token
///
/// Full validity check for other services: revocation, signature, expiry,
/// and the user-wide cutoff.
///
/// # Errors
/// - 400: Missing Authorization header
/// - 401: Invalid or revoked token
pub async fn validate_token(
    req: HttpRequest,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let header = authorization_header(&req)?;
    let validation = auth.validate_token(header)?;
    Ok(HttpResponse::Ok().json(validation))
}

/// POST /api/v1/auth/forgot-password
///
/// Always returns the same response whether or not the account exists.
pub async fn forgot_password(
    form: web::Json<ForgotPasswordRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    auth.request_password_reset(&form.email).await?;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "If the email is registered, a reset link has been sent.".to_string(),
    }))
}

/// POST /api/v1/auth/reset-password
///
/// # Errors
/// - 400: Invalid, expired, or already-used token; weak password
pub async fn reset_password(
    form: web::Json<ResetPasswordRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    auth.reset_password(&form.token, &form.new_password).await?;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Password has been reset. All existing sessions were signed out.".to_string(),
    }))
}

/// POST /api/v1/auth/verify-email
///
/// # Errors
/// - 400: Invalid or expired code, already verified
/// - 404: Unknown email
/// - 429: Attempt budget for this code exhausted
pub async fn verify_email(
    form: web::Json<VerifyEmailRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    auth.verify_email(&form.email, &form.code).await?;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Email verified. You can now log in.".to_string(),
    }))
}

/// POST /api/v1/auth/resend-verification
///
/// # Errors
/// - 400: Already verified
/// - 404: Unknown email
/// - 429: Hourly code-issue cap reached
pub async fn resend_verification(
    form: web::Json<ResendVerificationRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    auth.resend_verification(&form.email).await?;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "A new verification code has been sent.".to_string(),
    }))
}

/// GET /api/v1/auth/me
///
/// **Requires valid JWT access token** in the Authorization header.
/// The principal is built from the validated claims alone; no lookup.
pub async fn get_current_user(
    validation: web::ReqData<TokenValidation>,
) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(UserResponse {
        id: validation.user_id.to_string(),
        email: validation.email.clone(),
        roles: validation.roles.clone(),
    }))
}

/// The brute-force guard is keyed by this value, so it must come from the
/// TCP peer address. Forwarding headers are client-controlled and would let
/// an attacker pick a fresh counter per request.
fn client_ip(req: &HttpRequest) -> String {
    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn authorization_header(req: &HttpRequest) -> Result<&str, AppError> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::Auth(AuthError::MissingToken))
}
