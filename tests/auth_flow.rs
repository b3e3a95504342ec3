//! End-to-end tests of the authentication API.
//!
//! The server is spawned on a random port with in-memory stores and a local
//! test keypair, so no database or mail relay is needed.

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use auth_service::auth::{hash_password, CachedClaimsCodec, ClaimsCodec, TokenIssuer};
use auth_service::brute_force::BruteForceGuard;
use auth_service::credentials::{Credential, CredentialStore, InMemoryCredentialStore};
use auth_service::email_client::NoopMailer;
use auth_service::events::NoopEventPublisher;
use auth_service::keys::KeyProvider;
use auth_service::password_reset::{InMemoryResetTokenStore, PasswordResetLedger};
use auth_service::revocation::RevocationStore;
use auth_service::service::AuthService;
use auth_service::startup::run;
use auth_service::verification::VerificationCodeLedger;

const TEST_PRIVATE_PEM: &str = include_str!("../keys/local-only/private_key.pem");
const TEST_PUBLIC_PEM: &str = include_str!("../keys/local-only/public_key.pem");
const MEMBER_EMAIL: &str = "member@example.com";
const MEMBER_PASSWORD: &str = "ValidPass123!";

struct TestApp {
    address: String,
    client: reqwest::Client,
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }
}

async fn spawn_app() -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let keys = KeyProvider::from_pems(
        Some(TEST_PRIVATE_PEM.as_bytes()),
        TEST_PUBLIC_PEM.as_bytes(),
    )
    .expect("Failed to load test keys");
    let issuer =
        TokenIssuer::new(&keys, "test".to_string(), 900, 604800).expect("Failed to build issuer");
    let codec = CachedClaimsCodec::new(
        ClaimsCodec::new(keys, "test"),
        1024,
        Duration::from_secs(300),
    );

    let credentials = Arc::new(InMemoryCredentialStore::new());
    let mut member = Credential::new_registration(
        MEMBER_EMAIL.to_string(),
        hash_password(MEMBER_PASSWORD).expect("Failed to hash password"),
        "ROLE_MEMBER".to_string(),
    );
    member.enabled = true;
    member.email_verified = true;
    credentials
        .insert(&member)
        .await
        .expect("Failed to seed member");

    let auth = Arc::new(AuthService::new(
        credentials.clone(),
        issuer,
        codec,
        RevocationStore::new(1024, Duration::from_secs(86400)),
        BruteForceGuard::new(5, Duration::from_secs(900)),
        PasswordResetLedger::new(Arc::new(InMemoryResetTokenStore::new())),
        VerificationCodeLedger::new(1024, credentials),
        Arc::new(NoopMailer),
        Arc::new(NoopEventPublisher),
        "http://localhost:3000".to_string(),
        Duration::from_secs(604800),
    ));

    let server = run(listener, auth).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address,
        client: reqwest::Client::new(),
    }
}

async fn login(app: &TestApp, email: &str, password: &str) -> reqwest::Response {
    app.client
        .post(app.url("/api/v1/auth/login"))
        .json(&json!({ "email": email, "password": password }))
        .send()
        .await
        .expect("Failed to execute request")
}

async fn login_tokens(app: &TestApp) -> (String, String) {
    let response = login(app, MEMBER_EMAIL, MEMBER_PASSWORD).await;
    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.expect("Failed to parse response");
    (
        body["access_token"].as_str().unwrap().to_string(),
        body["refresh_token"].as_str().unwrap().to_string(),
    )
}

#[tokio::test]
async fn health_check_works() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(app.url("/health_check"))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
}

#[tokio::test]
async fn login_returns_tokens_that_authorize_me() {
    let app = spawn_app().await;
    let (access_token, _) = login_tokens(&app).await;

    let response = app
        .client
        .get(app.url("/api/v1/auth/me"))
        .bearer_auth(&access_token)
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["email"], MEMBER_EMAIL);
    assert_eq!(body["roles"][0], "ROLE_MEMBER");
}

#[tokio::test]
async fn wrong_password_returns_401_with_the_generic_code() {
    let app = spawn_app().await;

    let response = login(&app, MEMBER_EMAIL, "WrongPass123!").await;
    assert_eq!(401, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "INVALID_CREDENTIALS");

    // Unknown email gets the identical code.
    let response = login(&app, "ghost@example.com", MEMBER_PASSWORD).await;
    assert_eq!(401, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn fifth_failure_locks_out_even_the_correct_password() {
    let app = spawn_app().await;

    for _ in 0..5 {
        let response = login(&app, MEMBER_EMAIL, "WrongPass123!").await;
        assert_eq!(401, response.status().as_u16());
    }

    let response = login(&app, MEMBER_EMAIL, MEMBER_PASSWORD).await;
    assert_eq!(429, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "TOO_MANY_ATTEMPTS");
}

#[tokio::test]
async fn forged_forwarding_headers_do_not_evade_the_lockout() {
    let app = spawn_app().await;

    // The failure counter is keyed by the TCP peer address, so rotating
    // X-Forwarded-For must not buy fresh attempts.
    for i in 0..5 {
        let response = app
            .client
            .post(app.url("/api/v1/auth/login"))
            .header("X-Forwarded-For", format!("203.0.113.{}", i))
            .json(&json!({ "email": MEMBER_EMAIL, "password": "WrongPass123!" }))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(401, response.status().as_u16());
    }

    let response = app
        .client
        .post(app.url("/api/v1/auth/login"))
        .header("X-Forwarded-For", "203.0.113.99")
        .json(&json!({ "email": MEMBER_EMAIL, "password": MEMBER_PASSWORD }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(429, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "TOO_MANY_ATTEMPTS");
}

#[tokio::test]
async fn logout_revokes_the_access_token() {
    let app = spawn_app().await;
    let (access_token, _) = login_tokens(&app).await;

    let response = app
        .client
        .post(app.url("/api/v1/auth/logout"))
        .bearer_auth(&access_token)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(200, response.status().as_u16());

    let response = app
        .client
        .get(app.url("/api/v1/auth/me"))
        .bearer_auth(&access_token)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(401, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "TOKEN_REVOKED");
}

#[tokio::test]
async fn logout_is_idempotent() {
    let app = spawn_app().await;
    let (access_token, _) = login_tokens(&app).await;

    for _ in 0..2 {
        let response = app
            .client
            .post(app.url("/api/v1/auth/logout"))
            .bearer_auth(&access_token)
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(200, response.status().as_u16());
    }
}

#[tokio::test]
async fn refresh_returns_a_new_access_token_for_the_same_identity() {
    let app = spawn_app().await;
    let (access_token, refresh_token) = login_tokens(&app).await;

    let response = app
        .client
        .post(app.url("/api/v1/auth/refresh-token"))
        .json(&json!({ "refresh_token": refresh_token }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["refresh_token"], refresh_token.as_str());

    let old_me: Value = app
        .client
        .get(app.url("/api/v1/auth/me"))
        .bearer_auth(&access_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let new_me: Value = app
        .client
        .get(app.url("/api/v1/auth/me"))
        .bearer_auth(body["access_token"].as_str().unwrap())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(old_me["id"], new_me["id"]);
    assert_eq!(old_me["roles"], new_me["roles"]);
}

#[tokio::test]
async fn access_token_is_rejected_by_the_refresh_endpoint() {
    let app = spawn_app().await;
    let (access_token, _) = login_tokens(&app).await;

    let response = app
        .client
        .post(app.url("/api/v1/auth/refresh-token"))
        .json(&json!({ "refresh_token": access_token }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(401, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn validate_token_reports_the_token_identity() {
    let app = spawn_app().await;
    let (access_token, _) = login_tokens(&app).await;

    let response = app
        .client
        .post(app.url("/api/v1/auth/validate-token"))
        .bearer_auth(&access_token)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["valid"], true);
    assert_eq!(body["email"], MEMBER_EMAIL);
    assert_eq!(body["token_type"], "ACCESS");
}

#[tokio::test]
async fn protected_route_requires_a_bearer_token() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(app.url("/api/v1/auth/me"))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(401, response.status().as_u16());

    let response = app
        .client
        .get(app.url("/api/v1/auth/me"))
        .bearer_auth("not-a-real-token")
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(401, response.status().as_u16());
}

#[tokio::test]
async fn forgot_password_responses_do_not_reveal_account_existence() {
    let app = spawn_app().await;

    let known = app
        .client
        .post(app.url("/api/v1/auth/forgot-password"))
        .json(&json!({ "email": MEMBER_EMAIL }))
        .send()
        .await
        .expect("Failed to execute request");
    let known_status = known.status().as_u16();
    let known_body = known.text().await.unwrap();

    let unknown = app
        .client
        .post(app.url("/api/v1/auth/forgot-password"))
        .json(&json!({ "email": "ghost@example.com" }))
        .send()
        .await
        .expect("Failed to execute request");
    let unknown_status = unknown.status().as_u16();
    let unknown_body = unknown.text().await.unwrap();

    assert_eq!(known_status, 200);
    assert_eq!(known_status, unknown_status);
    assert_eq!(known_body, unknown_body);
}

#[tokio::test]
async fn reset_with_unknown_token_returns_the_invalid_code() {
    let app = spawn_app().await;

    let response = app
        .client
        .post(app.url("/api/v1/auth/reset-password"))
        .json(&json!({ "token": "no-such-token", "new_password": "NewValidPass123!" }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(400, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "PASSWORD_RESET_TOKEN_INVALID");
}

#[tokio::test]
async fn register_creates_a_disabled_account() {
    let app = spawn_app().await;

    let response = app
        .client
        .post(app.url("/api/v1/auth/register"))
        .json(&json!({
            "email": "new@example.com",
            "password": "ValidPass123!",
            "confirm_password": "ValidPass123!"
        }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(201, response.status().as_u16());

    // Login is refused until the email is verified.
    let response = login(&app, "new@example.com", "ValidPass123!").await;
    assert_eq!(401, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn duplicate_registration_returns_409() {
    let app = spawn_app().await;

    let response = app
        .client
        .post(app.url("/api/v1/auth/register"))
        .json(&json!({
            "email": MEMBER_EMAIL,
            "password": "ValidPass123!",
            "confirm_password": "ValidPass123!"
        }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(409, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "EMAIL_ALREADY_EXISTS");
}

#[tokio::test]
async fn mismatched_confirmation_returns_400() {
    let app = spawn_app().await;

    let response = app
        .client
        .post(app.url("/api/v1/auth/register"))
        .json(&json!({
            "email": "new@example.com",
            "password": "ValidPass123!",
            "confirm_password": "Different123!"
        }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(400, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "PASSWORD_MISMATCH");
}

#[tokio::test]
async fn verification_code_requests_are_rate_limited() {
    let app = spawn_app().await;

    app.client
        .post(app.url("/api/v1/auth/register"))
        .json(&json!({
            "email": "new@example.com",
            "password": "ValidPass123!",
            "confirm_password": "ValidPass123!"
        }))
        .send()
        .await
        .expect("Failed to execute request");

    // Registration consumed one issue; two resends exhaust the hourly cap.
    for _ in 0..2 {
        let response = app
            .client
            .post(app.url("/api/v1/auth/resend-verification"))
            .json(&json!({ "email": "new@example.com" }))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(200, response.status().as_u16());
    }

    let response = app
        .client
        .post(app.url("/api/v1/auth/resend-verification"))
        .json(&json!({ "email": "new@example.com" }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(429, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "TOO_MANY_EMAIL_ATTEMPTS");
}

#[tokio::test]
async fn wrong_verification_code_returns_400() {
    let app = spawn_app().await;

    app.client
        .post(app.url("/api/v1/auth/register"))
        .json(&json!({
            "email": "new@example.com",
            "password": "ValidPass123!",
            "confirm_password": "ValidPass123!"
        }))
        .send()
        .await
        .expect("Failed to execute request");

    let response = app
        .client
        .post(app.url("/api/v1/auth/verify-email"))
        .json(&json!({ "email": "new@example.com", "code": "000000" }))
        .send()
        .await
        .expect("Failed to execute request");
    let status = response.status().as_u16();
    let body: Value = response.json().await.unwrap();

    // A one-in-a-million collision with the real code would verify instead.
    assert!(status == 400 || status == 200);
    if status == 400 {
        assert_eq!(body["code"], "INVALID_VERIFICATION_CODE");
    }
}
