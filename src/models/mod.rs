use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Markets accepted by the upstream visual search API.
pub const MARKETS: &[&str] = &[
    "es-AR", "en-AU", "de-AT", "nl-BE", "fr-BE", "pt-BR", "en-CA", "fr-CA", "es-CL", "da-DK",
    "fi-FI", "fr-FR", "de-DE", "zh-HK", "en-IN", "en-ID", "it-IT", "ja-JP", "ko-KR", "en-MY",
    "es-MX", "nl-NL", "en-NZ", "no-NO", "zh-CN", "pl-PL", "pt-PT", "en-PH", "ru-RU", "ar-SA",
    "en-ZA", "es-ES", "sv-SE", "fr-CH", "de-CH", "zh-TW", "tr-TR", "en-GB", "en-US", "es-US",
];

/// A market code known to be in [`MARKETS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Market(&'static str);

impl Market {
    /// Exact, case-sensitive lookup.
    pub fn parse(raw: &str) -> Option<Self> {
        MARKETS.iter().find(|&&m| m == raw).map(|&m| Market(m))
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafeSearch {
    Moderate,
    Strict,
    Off,
}

impl SafeSearch {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "moderate" => Some(Self::Moderate),
            "strict" => Some(Self::Strict),
            "off" => Some(Self::Off),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Moderate => "moderate",
            Self::Strict => "strict",
            Self::Off => "off",
        }
    }
}

impl fmt::Display for SafeSearch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated search parameters, ready to be sent upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchRequest {
    pub market: Market,
    pub safe_search: SafeSearch,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[serde(rename = "userId", default)]
    pub user_id: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub auth: bool,
    pub jwt_token: Option<String>,
}

impl LoginResponse {
    pub fn granted(token: String) -> Self {
        Self {
            auth: true,
            jwt_token: Some(token),
        }
    }

    pub fn denied() -> Self {
        Self {
            auth: false,
            jwt_token: None,
        }
    }
}

/// Body returned when the `authkey` header is missing or rejected.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthFailure {
    pub auth: bool,
    pub message: String,
}

/// Multipart form accepted by the visual search routes (documentation only).
#[allow(dead_code)]
#[derive(ToSchema)]
pub struct VisualSearchForm {
    /// Image to search for, up to 1 MB
    #[schema(value_type = String, format = Binary)]
    pub image: Vec<u8>,
    /// Market code, e.g. `en-US`
    #[schema(example = "en-US")]
    pub mkt: String,
    /// One of `moderate`, `strict`, `off`
    #[schema(example = "moderate")]
    pub safesearch: String,
}
