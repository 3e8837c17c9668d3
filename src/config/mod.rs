use std::env;
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

/// Default upload cap: 1 MiB
pub const DEFAULT_MAX_FILE_SIZE: usize = 1024 * 1024;

/// Tokens expire five minutes after issuance
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 5 * 60;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Password material for the single gateway credential.
#[derive(Debug, Clone)]
pub enum PasswordSecret {
    /// Argon2 PHC string, verified as-is
    Hashed(String),
    /// Plaintext, hashed once when the token service is built
    Plain(String),
}

/// Gateway configuration, loaded once at startup and never mutated.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Visual search endpoint the images are forwarded to
    pub upstream_base_url: Url,

    /// Subscription key sent with every upstream call
    pub upstream_api_key: String,

    /// The only user id allowed to log in
    pub auth_user_id: String,

    /// Password for `auth_user_id`
    pub auth_password: PasswordSecret,

    /// HS256 signing secret for issued tokens
    pub jwt_secret: String,

    /// Token lifetime in seconds (default: 300)
    pub token_ttl_secs: i64,

    /// Directory holding uploads for the duration of one request (default: ./tmp)
    pub staging_dir: PathBuf,

    /// Maximum accepted image size in bytes (default: 1 MiB).
    /// The 413 message reports this value; the non-image message keeps its fixed "1 MB" wording.
    pub max_file_size: usize,

    /// Allowed CORS origins; `*` allows any
    pub allowed_origins: Vec<String>,
}

impl GatewayConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let base_uri = required("BASE_URI")?;
        let upstream_base_url = Url::parse(&base_uri).map_err(|e| ConfigError::Invalid {
            key: "BASE_URI",
            reason: e.to_string(),
        })?;

        let auth_password = match (lookup("AUTH_PASSWORD_HASH"), lookup("AUTH_PASSWORD")) {
            (Some(hash), _) if !hash.is_empty() => PasswordSecret::Hashed(hash),
            (_, Some(plain)) if !plain.is_empty() => PasswordSecret::Plain(plain),
            _ => return Err(ConfigError::Missing("AUTH_PASSWORD")),
        };

        Ok(Self {
            upstream_base_url,
            upstream_api_key: required("API_TOKEN")?,
            auth_user_id: required("AUTH_USER_ID")?,
            auth_password,
            jwt_secret: required("JWT_SECRET")?,

            token_ttl_secs: parse_or("TOKEN_TTL_SECS", &lookup, DEFAULT_TOKEN_TTL_SECS)?,

            staging_dir: lookup("STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./tmp")),

            max_file_size: parse_or("MAX_FILE_SIZE", &lookup, DEFAULT_MAX_FILE_SIZE)?,

            allowed_origins: lookup("ALLOWED_ORIGINS")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|| vec!["*".to_string()]),
        })
    }

    /// Config for local development and tests: fixed credential, no real upstream.
    pub fn development(upstream_base_url: Url, staging_dir: PathBuf) -> Self {
        Self {
            upstream_base_url,
            upstream_api_key: "dev-subscription-key".to_string(),
            auth_user_id: "admin".to_string(),
            auth_password: PasswordSecret::Plain("password".to_string()),
            jwt_secret: "secret".to_string(),
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            staging_dir,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allowed_origins: vec!["*".to_string()],
        }
    }
}

fn parse_or<T, F>(key: &'static str, lookup: &F, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
