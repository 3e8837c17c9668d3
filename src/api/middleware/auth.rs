use crate::AppState;
use crate::api::error::AppError;
use crate::services::token_service::AuthError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

/// Header the client sends its token in.
pub const AUTH_HEADER: &str = "authkey";

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(AUTH_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)?;

    let claims = state.tokens.verify(token)?;
    tracing::debug!("Token accepted for {}", claims.sub);

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
