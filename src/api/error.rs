use crate::models::{AuthFailure, LoginResponse};
use crate::services::staging::UploadError;
use crate::services::token_service::AuthError;
use crate::services::visual_search::ProxyError;
use crate::utils::validation::ValidationError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

pub const NOT_AN_IMAGE_MESSAGE: &str = "The uploaded file is not an image file, it is discarded. Please provide an image file upto size 1 MB.";
pub const INVALID_PARAMETERS_MESSAGE: &str =
    "The request body is invalid. Please check 'mkt' and 'safesearch' parameters";
pub const PROCESSING_FAILED_MESSAGE: &str = "An error occured while processing your request.";
pub const NOT_FOUND_MESSAGE: &str = "Error 404: Resource not found. The entered URL is invalid.";

/// 413 body, stated in terms of the configured image cap.
pub fn too_large_message(limit: usize) -> String {
    const KIB: usize = 1024;
    const MIB: usize = 1024 * KIB;

    let size = if limit >= MIB && limit % MIB == 0 {
        format!("{} MB", limit / MIB)
    } else if limit >= KIB && limit % KIB == 0 {
        format!("{} KB", limit / KIB)
    } else {
        format!("{} bytes", limit)
    };
    format!("The uploaded file is too large. Please provide an image file upto size {size}.")
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Proxy(#[from] ProxyError),

    #[error("Not Found")]
    NotFound,
}

fn auth_failure(status: StatusCode, message: &str) -> Response {
    let body = Json(AuthFailure {
        auth: false,
        message: message.to_string(),
    });
    (status, body).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Auth(AuthError::InvalidCredentials) => {
                (StatusCode::UNAUTHORIZED, Json(LoginResponse::denied())).into_response()
            }
            AppError::Auth(AuthError::MissingToken) => {
                auth_failure(StatusCode::FORBIDDEN, "No token provided.")
            }
            AppError::Auth(AuthError::InvalidToken) => auth_failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to authenticate token.",
            ),
            AppError::Auth(AuthError::Signing(e)) => {
                tracing::error!("Token signing failed: {:?}", e);
                auth_failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to issue token.")
            }

            AppError::Upload(UploadError::NotAnImage) => {
                (StatusCode::BAD_REQUEST, NOT_AN_IMAGE_MESSAGE).into_response()
            }
            AppError::Upload(UploadError::TooLarge { limit }) => {
                (StatusCode::PAYLOAD_TOO_LARGE, too_large_message(limit)).into_response()
            }
            AppError::Upload(UploadError::Malformed(msg)) => {
                (StatusCode::BAD_REQUEST, msg).into_response()
            }
            AppError::Upload(UploadError::Io(e)) => {
                tracing::error!("Staging I/O error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, PROCESSING_FAILED_MESSAGE).into_response()
            }

            AppError::Validation(e) => {
                tracing::info!("Rejected search parameters: {}", e);
                (StatusCode::BAD_REQUEST, INVALID_PARAMETERS_MESSAGE).into_response()
            }

            AppError::Proxy(ProxyError::Io(e)) => {
                tracing::error!("Staged file unreadable: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, PROCESSING_FAILED_MESSAGE).into_response()
            }
            AppError::Proxy(e) => {
                tracing::error!("Upstream error: {}", e);
                (StatusCode::BAD_REQUEST, PROCESSING_FAILED_MESSAGE).into_response()
            }

            AppError::NotFound => (StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE).into_response(),
        }
    }
}
