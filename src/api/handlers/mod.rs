pub mod auth;
pub mod health;
pub mod visual_search;

use crate::api::error::AppError;
use axum::http::Uri;

/// Fallback for every unmatched path.
pub async fn not_found(uri: Uri) -> AppError {
    tracing::info!("Invalid URL request: {}", uri);
    AppError::NotFound
}
