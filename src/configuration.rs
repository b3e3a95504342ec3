use config::ConfigError;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    pub security: SecuritySettings,
    pub email: EmailSettings,
    pub events: EventSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    pub port: u16,
    pub frontend_url: String,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// JWT issuance/verification settings.
///
/// Signing uses the RS256 private key; verification needs only the public
/// key, so a process that never issues tokens can leave `private_key_path`
/// empty.
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub private_key_path: Option<String>,
    pub public_key_path: String,
    pub access_token_expiry: i64,  // seconds (e.g., 900 for 15 minutes)
    pub refresh_token_expiry: i64, // seconds (e.g., 604800 for 7 days)
    pub issuer: String,
}

/// Brute-force, blacklist, and claims-cache tuning.
#[derive(serde::Deserialize, Clone)]
pub struct SecuritySettings {
    pub max_login_attempts: u32,
    pub login_window_seconds: u64,
    pub claims_cache_ttl_seconds: u64,
    pub claims_cache_capacity: usize,
    pub blacklist_fallback_ttl_seconds: u64,
}

#[derive(serde::Deserialize, Clone)]
pub struct EmailSettings {
    pub base_url: String,
    pub sender: String,
}

#[derive(serde::Deserialize, Clone)]
pub struct EventSettings {
    pub webhook_url: String,
}

pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .set_default("application.port", 8080)?
        .set_default("application.frontend_url", "http://localhost:3000")?
        .set_default("database.username", "postgres")?
        .set_default("database.password", "password")?
        .set_default("database.port", 5432)?
        .set_default("database.host", "127.0.0.1")?
        .set_default("database.database_name", "auth")?
        .set_default("jwt.private_key_path", "keys/local-only/private_key.pem")?
        .set_default("jwt.public_key_path", "keys/local-only/public_key.pem")?
        .set_default("jwt.access_token_expiry", 900)?
        .set_default("jwt.refresh_token_expiry", 604800)?
        .set_default("jwt.issuer", "auth-service")?
        .set_default("security.max_login_attempts", 5)?
        .set_default("security.login_window_seconds", 900)?
        .set_default("security.claims_cache_ttl_seconds", 300)?
        .set_default("security.claims_cache_capacity", 10000)?
        .set_default("security.blacklist_fallback_ttl_seconds", 86400)?
        .set_default("email.base_url", "http://localhost:8025")?
        .set_default("email.sender", "no-reply@example.com")?
        .set_default("events.webhook_url", "http://localhost:9090/events")?
        .add_source(config::File::with_name("configuration").required(false))
        .build()?;
    settings.try_deserialize::<Settings>()
}
