use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;

use auth_service::auth::{CachedClaimsCodec, ClaimsCodec, TokenIssuer};
use auth_service::brute_force::BruteForceGuard;
use auth_service::configuration::get_configuration;
use auth_service::credentials::PostgresCredentialStore;
use auth_service::email_client::{EmailClient, SenderAddress};
use auth_service::events::HttpEventPublisher;
use auth_service::keys::KeyProvider;
use auth_service::password_reset::{PasswordResetLedger, PostgresResetTokenStore};
use auth_service::revocation::RevocationStore;
use auth_service::service::AuthService;
use auth_service::startup::run;
use auth_service::telemetry::init_telemetry;
use auth_service::verification::VerificationCodeLedger;

const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting authentication service");

    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    let connection_string = configuration.database.connection_string();
    tracing::info!("Attempting to connect to database");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&connection_string)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "Database connection error",
            )
        })?;

    tracing::info!("Database connection pool created successfully");

    let keys = KeyProvider::from_settings(&configuration.jwt).map_err(|e| {
        tracing::error!("Failed to load signing keys: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "Key loading error")
    })?;

    let issuer = TokenIssuer::new(
        &keys,
        configuration.jwt.issuer.clone(),
        configuration.jwt.access_token_expiry,
        configuration.jwt.refresh_token_expiry,
    )
    .map_err(|e| {
        tracing::error!("Failed to build token issuer: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "Key loading error")
    })?;

    let codec = CachedClaimsCodec::new(
        ClaimsCodec::new(keys, &configuration.jwt.issuer),
        configuration.security.claims_cache_capacity,
        Duration::from_secs(configuration.security.claims_cache_ttl_seconds),
    );

    let sender = SenderAddress::parse(configuration.email.sender.clone()).map_err(|e| {
        tracing::error!("Invalid sender address: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;
    let http_client = reqwest::Client::new();
    let mailer = Arc::new(EmailClient::new(
        configuration.email.base_url.clone(),
        sender,
        http_client.clone(),
    ));
    let publisher = Arc::new(HttpEventPublisher::new(
        configuration.events.webhook_url.clone(),
        http_client,
    ));

    let credentials = Arc::new(PostgresCredentialStore::new(pool.clone()));
    let auth = Arc::new(AuthService::new(
        credentials.clone(),
        issuer,
        codec,
        RevocationStore::new(
            configuration.security.claims_cache_capacity,
            Duration::from_secs(configuration.security.blacklist_fallback_ttl_seconds),
        ),
        BruteForceGuard::new(
            configuration.security.max_login_attempts,
            Duration::from_secs(configuration.security.login_window_seconds),
        ),
        PasswordResetLedger::new(Arc::new(PostgresResetTokenStore::new(pool))),
        VerificationCodeLedger::new(
            configuration.security.claims_cache_capacity,
            credentials,
        ),
        mailer,
        publisher,
        configuration.application.frontend_url.clone(),
        Duration::from_secs(configuration.jwt.refresh_token_expiry as u64),
    ));

    // Periodic cleanup of expired reset tokens and in-process TTL entries.
    let sweeper = auth.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = sweeper.sweep_expired().await {
                tracing::error!(error = %e, "Periodic sweep failed");
            }
        }
    });

    let address = format!("127.0.0.1:{}", configuration.application.port);
    tracing::info!("Binding server to address: {}", address);

    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    let server = run(listener, auth)?;
    tracing::info!("Server started successfully");

    server.await
}
