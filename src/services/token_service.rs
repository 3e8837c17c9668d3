use crate::config::{ConfigError, GatewayConfig, PasswordSecret};
use crate::utils::auth::{check_password_hash, constant_time_eq, hash_password, verify_password};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("no token provided")]
    MissingToken,

    #[error("failed to authenticate token")]
    InvalidToken,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// Issues and verifies the short-lived tokens that gate the search routes.
///
/// Holds the single configured credential; verification is stateless.
pub struct TokenService {
    user_id: String,
    password_hash: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl TokenService {
    pub fn new(
        user_id: impl Into<String>,
        password_hash: impl Into<String>,
        secret: &str,
        ttl: Duration,
    ) -> Result<Self, ConfigError> {
        let password_hash = password_hash.into();
        check_password_hash(&password_hash).map_err(|e| ConfigError::Invalid {
            key: "AUTH_PASSWORD_HASH",
            reason: e.to_string(),
        })?;

        Ok(Self {
            user_id: user_id.into(),
            password_hash,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        })
    }

    /// Build from configuration, hashing a plaintext password once.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ConfigError> {
        let password_hash = match &config.auth_password {
            PasswordSecret::Hashed(phc) => phc.clone(),
            PasswordSecret::Plain(plain) => {
                hash_password(plain).map_err(|e| ConfigError::Invalid {
                    key: "AUTH_PASSWORD",
                    reason: e.to_string(),
                })?
            }
        };

        Self::new(
            config.auth_user_id.clone(),
            password_hash,
            &config.jwt_secret,
            Duration::seconds(config.token_ttl_secs),
        )
    }

    pub fn issue(&self, user_id: &str, password: &str) -> Result<String, AuthError> {
        self.issue_at(user_id, password, Utc::now())
    }

    /// Issue a token as if the current time were `now`.
    pub fn issue_at(
        &self,
        user_id: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        // Both checks always run so the response time does not reveal which one failed
        let user_ok = constant_time_eq(user_id, &self.user_id);
        let password_ok = verify_password(password, &self.password_hash);
        if !(user_ok & password_ok) {
            return Err(AuthError::InvalidCredentials);
        }

        let claims = Claims {
            sub: self.user_id.clone(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding_key,
        )?)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        self.verify_at(token, Utc::now())
    }

    /// Verify a token against the clock value `now`. Expiry has no leeway.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| {
                tracing::debug!("Token rejected: {}", e);
                AuthError::InvalidToken
            })?
            .claims;

        if now.timestamp() >= claims.exp {
            tracing::debug!("Token for {} expired at {}", claims.sub, claims.exp);
            return Err(AuthError::InvalidToken);
        }

        Ok(claims)
    }
}
