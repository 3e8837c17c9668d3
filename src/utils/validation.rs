use crate::models::{Market, SafeSearch, SearchRequest};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid search parameters (mkt={market:?}, safesearch={safe_search:?})")]
    InvalidParameters {
        market: Option<String>,
        safe_search: Option<String>,
    },
}

/// Checks `mkt` and `safesearch` against their closed sets. No normalization is
/// applied; a missing field is invalid.
pub fn validate_search(
    market: Option<&str>,
    safe_search: Option<&str>,
) -> Result<SearchRequest, ValidationError> {
    let parsed_market = market.and_then(Market::parse);
    let parsed_safe = safe_search.and_then(SafeSearch::parse);

    match (parsed_market, parsed_safe) {
        (Some(market), Some(safe_search)) => Ok(SearchRequest {
            market,
            safe_search,
        }),
        _ => Err(ValidationError::InvalidParameters {
            market: market.map(str::to_owned),
            safe_search: safe_search.map(str::to_owned),
        }),
    }
}

/// Reduces a client supplied filename to a safe display name.
/// Path components are dropped and reserved characters replaced.
pub fn sanitize_filename(filename: &str) -> String {
    // Treat both separators as path boundaries regardless of platform
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim();

    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::warn!("Path components stripped from upload name: {}", filename);
    }

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control() || matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|' | ';') {
                '_'
            } else {
                c
            }
        })
        .collect();

    let sanitized = sanitized.trim_start_matches('.');

    if sanitized.is_empty() {
        return "upload".to_string();
    }

    // Limit length safely for UTF-8
    if sanitized.len() > 255 {
        let mut end = 255;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        return sanitized[..end].to_string();
    }

    sanitized.to_string()
}

/// Lower-cased extension of a sanitized name, alphanumeric only, at most 8 chars.
pub fn staging_extension(sanitized: &str) -> Option<String> {
    Path::new(sanitized)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase())
}
