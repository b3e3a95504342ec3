/// RS256 keypair loading.
///
/// The provider is constructed once at the composition root and injected
/// into the token issuer and claims codec. Verification-only processes hold
/// just the public key: they can validate tokens but never forge them.

use jsonwebtoken::{DecodingKey, EncodingKey};

use crate::configuration::JwtSettings;
use crate::error::{AppError, ConfigError};

#[derive(Clone)]
pub struct KeyProvider {
    encoding: Option<EncodingKey>,
    decoding: DecodingKey,
}

impl KeyProvider {
    /// Loads the keypair from the paths in `JwtSettings`.
    /// `private_key_path` may be absent for verification-only processes.
    pub fn from_settings(settings: &JwtSettings) -> Result<Self, AppError> {
        let public_pem = std::fs::read(&settings.public_key_path).map_err(|e| {
            AppError::Config(ConfigError::MissingRequired(format!(
                "public key at {}: {}",
                settings.public_key_path, e
            )))
        })?;

        let private_pem = match &settings.private_key_path {
            Some(path) => Some(std::fs::read(path).map_err(|e| {
                AppError::Config(ConfigError::MissingRequired(format!(
                    "private key at {}: {}",
                    path, e
                )))
            })?),
            None => None,
        };

        Self::from_pems(private_pem.as_deref(), &public_pem)
    }

    /// Builds a provider from in-memory PEM data.
    pub fn from_pems(private_pem: Option<&[u8]>, public_pem: &[u8]) -> Result<Self, AppError> {
        let decoding = DecodingKey::from_rsa_pem(public_pem).map_err(|e| {
            AppError::Config(ConfigError::InvalidValue(format!("public key PEM: {}", e)))
        })?;

        let encoding = match private_pem {
            Some(pem) => Some(EncodingKey::from_rsa_pem(pem).map_err(|e| {
                AppError::Config(ConfigError::InvalidValue(format!("private key PEM: {}", e)))
            })?),
            None => None,
        };

        Ok(Self { encoding, decoding })
    }

    /// Builds a provider that can only verify tokens.
    pub fn verification_only(public_pem: &[u8]) -> Result<Self, AppError> {
        Self::from_pems(None, public_pem)
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }

    /// Fails for verification-only providers.
    pub fn encoding_key(&self) -> Result<&EncodingKey, AppError> {
        self.encoding.as_ref().ok_or_else(|| {
            AppError::Config(ConfigError::MissingRequired(
                "private signing key (verification-only provider)".to_string(),
            ))
        })
    }

    pub fn can_sign(&self) -> bool {
        self.encoding.is_some()
    }
}
